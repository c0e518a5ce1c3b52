//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`]: the whole [`ConfigStore`] is serialized
//! with postcard into a single blob under one namespace/key pair, so a
//! save is one atomic `nvs_commit`. The simulation backend keeps the
//! blob in memory (and can be scripted to fail, for retry tests).

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::StoragePort;
use crate::config::ConfigStore;
use crate::error::{Error, StorageError};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "doorbell";
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &[u8] = b"config\0";

const MAX_BLOB_SIZE: usize = 2048;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    sim_blob: std::cell::RefCell<Option<Vec<u8>>>,
    #[cfg(not(target_os = "espidf"))]
    sim_fail_saves: std::cell::Cell<u32>,
}

impl NvsAdapter {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after a partition version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the single
            // main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("nvs: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(Error::Init("NVS erase failed"));
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(Error::Init("NVS re-init failed"));
                }
            } else if ret != ESP_OK {
                return Err(Error::Init("NVS init failed"));
            }
            info!("nvs: flash initialised (namespace '{}')", CONFIG_NAMESPACE);
        }

        #[cfg(not(target_os = "espidf"))]
        info!("nvs(sim): in-memory backend (namespace '{}')", CONFIG_NAMESPACE);

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            sim_blob: std::cell::RefCell::new(None),
            #[cfg(not(target_os = "espidf"))]
            sim_fail_saves: std::cell::Cell::new(0),
        })
    }

    /// Simulation only: make the next `n` saves fail with `IoError`.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_saves(&self, n: u32) {
        self.sim_fail_saves.set(n);
    }

    /// Open the config namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns = CONFIG_NAMESPACE.as_bytes();
        ns_buf[..ns.len()].copy_from_slice(ns);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

impl StoragePort for NvsAdapter {
    fn load(&self) -> Result<Option<ConfigStore>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.sim_blob.borrow().as_deref() {
                Some(bytes) => {
                    let store: ConfigStore =
                        postcard::from_bytes(bytes).map_err(|_| StorageError::Corrupted)?;
                    info!("nvs(sim): loaded config ({} bytes)", bytes.len());
                    Ok(Some(store))
                }
                None => Ok(None),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let mut size: usize = 0;

                // First call: query the stored size.
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let store: ConfigStore =
                        postcard::from_bytes(&bytes).map_err(|_| StorageError::Corrupted)?;
                    info!("nvs: loaded config ({} bytes)", bytes.len());
                    Ok(Some(store))
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
                Err(e) => {
                    warn!("nvs: read error {}", e);
                    Err(StorageError::IoError)
                }
            }
        }
    }

    fn save(&mut self, store: &ConfigStore) -> Result<(), StorageError> {
        let bytes: Vec<u8> = postcard::to_allocvec(store).map_err(|_| StorageError::IoError)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let pending = self.sim_fail_saves.get();
            if pending > 0 {
                self.sim_fail_saves.set(pending - 1);
                return Err(StorageError::IoError);
            }
            *self.sim_blob.borrow_mut() = Some(bytes);
            info!("nvs(sim): config saved");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("nvs: config saved ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StorageError::Full),
                Err(e) => {
                    warn!("nvs: write error {}", e);
                    Err(StorageError::IoError)
                }
            }
        }
    }
}
