// MIT License
//
// Copyright (c) 2025 Ronan LE MEILLAT for SCTG Development
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use fan_controller::hardware::rpi::RpiFan;
use fan_controller::{initialize_gains, logging, shutdown};
use fan_controller::{Config, ControlEngine, Daemon, FanHardware, JsonGainStore};
use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

const I2C_BUS: &str = "/dev/i2c-1";
const CONFIG_PATH: &str = "/etc/adaptive-fan/rpi.toml";

fn main() -> Result<(), Box<dyn Error>> {
    logging::init();

    let config_path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
    let config = Config::load(&config_path)?;

    println!("Raspberry Pi adaptive fan controller");
    println!("Target temperature: {}°C", config.control.target_temp);
    println!("Sensors: {} | Fan: {}", config.sensors.ids.join(", "), config.actuator.id);

    let hardware = RpiFan::open(I2C_BUS, &config.actuator.id)?;
    hardware.check_privileges()?;

    let stop = shutdown::stop_flag()?;

    let mut store = JsonGainStore::new(&config.gains.path);
    let gains = initialize_gains(&mut store, config.default_gains());
    let engine = ControlEngine::new(&config, store, gains);

    let tick_interval = Duration::from_millis(config.control.tick_interval_ms);
    let mut daemon = Daemon::new(hardware, engine, tick_interval);
    daemon.run(&stop)?;

    println!("Stopped with gains {}", daemon.engine().gains());
    Ok(())
}
