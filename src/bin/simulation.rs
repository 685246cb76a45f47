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

use fan_controller::hardware::{CoolingRig, SimulatedFan};
use fan_controller::{initialize_gains, logging};
use fan_controller::{Config, ControlEngine, JsonGainStore, ManualMode, TuneOutcome, Verdict};
use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    logging::init();

    // Heat source cooled by a fan, starting at ambient 25°C:
    // 400J/°C heat capacity, 60W load, 0.4 W/°C passive loss,
    // up to 2.5 W/°C extra loss at full fan speed
    let rig = CoolingRig::new(25.0, 25.0, 400.0, 60.0, 0.4, 2.5);
    let mut fan = SimulatedFan::new(
        rig,
        vec![("cpu".to_string(), 0.0), ("board".to_string(), -6.0)],
    );

    let mut config = Config::default();
    config.sensors.ids = vec!["cpu".to_string(), "board".to_string()];
    config.gains.path = env::temp_dir().join("fan-simulation-gains.json");

    let mut store = JsonGainStore::new(&config.gains.path);
    let gains = initialize_gains(&mut store, config.default_gains());
    let mut engine = ControlEngine::new(&config, store, gains);

    println!("Adaptive fan simulation, target {}°C", config.control.target_temp);
    println!("Starting gains: {}", gains);
    println!("Time(s) | Temperature(°C) | Level | Window outcome");
    println!("--------|-----------------|-------|---------------");

    // Simulation parameters
    let dt = 0.1; // time step in seconds
    let sampling_interval = 1.0; // Run one control tick every 1s
    let simulation_duration = 4.0 * 3600.0;
    let mut elapsed_time = 0.0;
    let mut next_sample_time = 0.0;

    let mut manual = ManualMode::engage(&mut fan)?;
    while elapsed_time < simulation_duration {
        if elapsed_time >= next_sample_time {
            let report = engine.tick(&mut *manual)?;

            if let Some(outcome) = report.outcome {
                println!(
                    "{:7.0} | {:15.2} | {:5} | {}",
                    elapsed_time,
                    report.temperature,
                    report.level,
                    describe(&outcome)
                );
            }

            next_sample_time += sampling_interval;
        }

        // Update thermal system simulation
        manual.advance(dt);
        elapsed_time += dt;
    }

    if let Err(e) = engine.persist() {
        eprintln!("Could not save tuned gains: {}", e);
    }
    manual.release()?;

    let stats = engine.stats();
    println!("\nSimulation complete!");
    println!(
        "Experiments: {} ({} accepted, {} reverted)",
        stats.experiments, stats.accepted, stats.reverted
    );
    println!("Tuned gains: {}", engine.gains());
    println!("Final temperature: {:.2}°C", fan.rig().get_temperature());
    Ok(())
}

fn describe(outcome: &TuneOutcome) -> String {
    let verdict = match outcome.verdict {
        Some(Verdict::Accepted { gain, cost, baseline_cost, .. }) => {
            format!("kept {} (cost {:.3} < {:.3}), ", gain, cost, baseline_cost)
        }
        Some(Verdict::Reverted { gain, cost, baseline_cost }) => {
            format!("reverted {} (cost {:.3} >= {:.3}), ", gain, cost, baseline_cost)
        }
        None => String::new(),
    };
    let trial = &outcome.started;
    format!("{}trying {} {:.4} -> {:.4}", verdict, trial.gain, trial.from, trial.to)
}
