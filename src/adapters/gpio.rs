//! GPIO adapter — the only module that touches the three real pins.
//!
//! On ESP-IDF the pins are configured with raw `gpio_config` calls (input
//! with pull-up for the button, push-pull outputs for ringer and
//! indicator). On other targets the adapter keeps pin levels in memory so
//! host tests can script the button and observe the outputs.

use crate::app::ports::GpioPort;
use crate::error::Error;
#[cfg(target_os = "espidf")]
use crate::pins;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub struct GpioAdapter {
    #[cfg(not(target_os = "espidf"))]
    sim_button_raw: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_ringer: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_indicator: bool,
}

impl Default for GpioAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            // Idle level of an active-low button with pull-up.
            sim_button_raw: true,
            #[cfg(not(target_os = "espidf"))]
            sim_ringer: false,
            #[cfg(not(target_os = "espidf"))]
            sim_indicator: false,
        }
    }

    /// Simulation only: script the raw button level for the next samples.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_button_raw(&mut self, level: bool) {
        self.sim_button_raw = level;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_ringer(&self) -> bool {
        self.sim_ringer
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_indicator(&self) -> bool {
        self.sim_indicator
    }

    #[cfg(target_os = "espidf")]
    fn write_pin(gpio: i32, level: bool) {
        // SAFETY: pin was configured as output in init(); single-threaded
        // control-loop access only.
        unsafe {
            gpio_set_level(gpio, u32::from(level ^ pins::INVERT_OUTPUT));
        }
    }
}

impl GpioPort for GpioAdapter {
    #[cfg(target_os = "espidf")]
    fn init(&mut self) -> Result<(), Error> {
        let button_cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pins::BUTTON_GPIO,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: called once from main() before the control loop starts.
        let ret = unsafe { gpio_config(&button_cfg) };
        if ret != ESP_OK {
            return Err(Error::Init("button GPIO config failed"));
        }

        for &pin in &[pins::RINGER_GPIO, pins::LED_GPIO] {
            let out_cfg = gpio_config_t {
                pin_bit_mask: 1u64 << pin,
                mode: gpio_mode_t_GPIO_MODE_OUTPUT,
                pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
                pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
                intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
            };
            // SAFETY: same single-threaded init path.
            let ret = unsafe { gpio_config(&out_cfg) };
            if ret != ESP_OK {
                return Err(Error::Init("output GPIO config failed"));
            }
        }

        Self::write_pin(pins::RINGER_GPIO, false);
        Self::write_pin(pins::LED_GPIO, false);
        log::info!("gpio: pins configured (button={}, ringer={}, led={})",
            pins::BUTTON_GPIO, pins::RINGER_GPIO, pins::LED_GPIO);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn init(&mut self) -> Result<(), Error> {
        log::info!("gpio(sim): pin setup skipped");
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn read_button_raw(&mut self) -> bool {
        // SAFETY: pin configured as input in init().
        unsafe { gpio_get_level(pins::BUTTON_GPIO) != 0 }
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_button_raw(&mut self) -> bool {
        self.sim_button_raw
    }

    #[cfg(target_os = "espidf")]
    fn set_ringer(&mut self, on: bool) {
        Self::write_pin(pins::RINGER_GPIO, on);
    }

    #[cfg(not(target_os = "espidf"))]
    fn set_ringer(&mut self, on: bool) {
        self.sim_ringer = on;
    }

    #[cfg(target_os = "espidf")]
    fn set_indicator(&mut self, on: bool) {
        Self::write_pin(pins::LED_GPIO, on);
    }

    #[cfg(not(target_os = "espidf"))]
    fn set_indicator(&mut self, on: bool) {
        self.sim_indicator = on;
    }
}
