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

//! Tick-driven control loop.
//!
//! [`ControlEngine`] runs one PID tick per call and hands every completed
//! evaluation window to the tuner. [`Daemon`] paces the engine in real time
//! while holding manual fan control, and always persists the gains and hands
//! the fan back to automatic control on the way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::cost::SampleWindow;
use crate::error::Result;
use crate::gains::{GainStore, GainTriple};
use crate::hardware::{FanHardware, ManualMode};
use crate::pid::PidController;
use crate::tuner::{AdaptiveTuner, Trial, TuneOutcome, TunerStats, Verdict};

/// Longest uninterrupted sleep, bounding how late a stop request is noticed
const POLL_SLICE: Duration = Duration::from_millis(10);

/// What one tick observed and did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub temperature: f32,
    pub error: f32,
    pub level: u32,
    pub outcome: Option<TuneOutcome>,
}

pub struct ControlEngine<S, R = StdRng> {
    sensors: Vec<String>,
    pid: PidController,
    tuner: AdaptiveTuner<R>,
    window: SampleWindow,
    window_size: u64,
    store: S,
    ticks: u64,
    applied_level: Option<u32>,
    persistence_failures: u64,
}

impl<S: GainStore> ControlEngine<S, StdRng> {
    pub fn new(config: &Config, store: S, gains: GainTriple) -> Self {
        Self::with_rng(config, store, gains, StdRng::from_entropy())
    }
}

impl<S: GainStore, R: Rng> ControlEngine<S, R> {
    pub fn with_rng(config: &Config, store: S, gains: GainTriple, rng: R) -> Self {
        let window_size = config.tuning.window_size.max(1);
        ControlEngine {
            sensors: config.sensors.ids.clone(),
            pid: PidController::new(
                config.control.target_temp,
                config.control.feed_forward_scale,
                config.actuator.min_level,
                config.actuator.max_level,
            ),
            tuner: AdaptiveTuner::with_rng(
                gains,
                config.cost,
                config.tuning.perturbation_scale,
                rng,
            ),
            window: SampleWindow::new(window_size),
            window_size: window_size as u64,
            store,
            ticks: 0,
            applied_level: None,
            persistence_failures: 0,
        }
    }

    /// Read the sensors, command the fan and tune at window boundaries.
    ///
    /// Hardware faults abort the tick and are returned unchanged. Gain store
    /// failures are logged and counted unless they are fatal.
    pub fn tick<H: FanHardware>(&mut self, hardware: &mut H) -> Result<TickReport> {
        let temperature = hardware.read_max_temperature(&self.sensors)?;
        let gains = *self.tuner.gains();
        let level = self.pid.compute(temperature, &gains);

        // Skip redundant writes
        if self.applied_level != Some(level) {
            hardware.set_actuation(level)?;
            self.applied_level = Some(level);
        }

        let error = temperature - self.pid.setpoint;
        self.window.push(error, level);
        self.ticks += 1;
        tracing::debug!(tick = self.ticks, temperature, error, level, "tick");

        let outcome = if self.ticks % self.window_size == 0 {
            Some(self.tune()?)
        } else {
            None
        };

        Ok(TickReport {
            tick: self.ticks,
            temperature,
            error,
            level,
            outcome,
        })
    }

    fn tune(&mut self) -> Result<TuneOutcome> {
        let outcome = self.tuner.evaluate(&mut self.window);
        match outcome.verdict {
            Some(Verdict::Accepted {
                gain,
                cost,
                baseline_cost,
                gains,
            }) => {
                tracing::info!(%gain, cost, baseline_cost, %gains, "experiment accepted");
                if let Err(e) = self.store.save(&gains) {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    self.persistence_failures += 1;
                    tracing::warn!(error = %e, "failed to persist accepted gains, keeping them in memory");
                }
            }
            Some(Verdict::Reverted {
                gain,
                cost,
                baseline_cost,
            }) => {
                tracing::info!(%gain, cost, baseline_cost, "experiment reverted");
            }
            None => {}
        }

        let Trial {
            gain,
            from,
            to,
            baseline_cost,
        } = outcome.started;
        tracing::info!(%gain, from, to, baseline_cost, "experiment started");

        let stats = self.tuner.stats();
        tracing::debug!(
            windows = stats.windows,
            experiments = stats.experiments,
            accepted = stats.accepted,
            reverted = stats.reverted,
            "tuner stats"
        );
        Ok(outcome)
    }

    /// Save the live gains to the store.
    pub fn persist(&mut self) -> Result<()> {
        let gains = *self.tuner.gains();
        let result = self.store.save(&gains);
        if result.is_err() {
            self.persistence_failures += 1;
        }
        result
    }

    pub fn gains(&self) -> &GainTriple {
        self.tuner.gains()
    }

    pub fn tuner(&self) -> &AdaptiveTuner<R> {
        &self.tuner
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn stats(&self) -> &TunerStats {
        self.tuner.stats()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Level last written to the fan, if any.
    pub fn applied_level(&self) -> Option<u32> {
        self.applied_level
    }

    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Real-time driver around a [`ControlEngine`].
pub struct Daemon<H, S, R = StdRng> {
    hardware: H,
    engine: ControlEngine<S, R>,
    tick_interval: Duration,
}

impl<H: FanHardware, S: GainStore, R: Rng> Daemon<H, S, R> {
    pub fn new(hardware: H, engine: ControlEngine<S, R>, tick_interval: Duration) -> Self {
        Daemon {
            hardware,
            engine,
            tick_interval,
        }
    }

    /// Control the fan until `stop` is set or a fatal fault occurs.
    ///
    /// Privileges are checked before touching the hardware. Once manual mode
    /// is engaged every exit path persists the gains and then restores
    /// automatic mode; the first fault encountered is returned.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        self.hardware.check_privileges()?;

        let Daemon {
            hardware,
            engine,
            tick_interval,
        } = self;
        let mut fan = ManualMode::engage(hardware)?;

        let result = control_until(engine, &mut *fan, *tick_interval, stop);
        if let Err(e) = &result {
            tracing::error!(error = %e, tick = engine.ticks(), "control loop stopped by fault");
        }

        match engine.persist() {
            Ok(()) => tracing::info!(gains = %engine.gains(), "gains persisted"),
            Err(e) => tracing::warn!(error = %e, "failed to persist gains on shutdown"),
        }
        let restored = fan.release();

        result.and(restored)
    }

    pub fn engine(&self) -> &ControlEngine<S, R> {
        &self.engine
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }
}

fn control_until<H, S, R>(
    engine: &mut ControlEngine<S, R>,
    fan: &mut H,
    interval: Duration,
    stop: &AtomicBool,
) -> Result<()>
where
    H: FanHardware,
    S: GainStore,
    R: Rng,
{
    let mut next_sample_time = Instant::now();
    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();

        // Check if it's time to take a temperature measurement
        if now >= next_sample_time {
            engine.tick(fan)?;
            next_sample_time = now + interval;
        }

        let remaining = next_sample_time.saturating_duration_since(Instant::now());
        thread::sleep(remaining.min(POLL_SLICE));
    }
    tracing::info!(ticks = engine.ticks(), "stop requested");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostWeights;
    use crate::error::FanError;
    use crate::gains::tests::MemoryStore;
    use crate::gains::Gain;
    use crate::hardware::tests::ScriptedFan;
    use std::sync::Arc;

    fn config(window_size: usize) -> Config {
        let mut config = Config::default();
        config.tuning.window_size = window_size;
        config.sensors.ids = vec!["cpu".to_string()];
        config.cost = CostWeights {
            error: 1.0,
            power: 0.0,
            overshoot: 1.0,
        };
        config
    }

    fn engine(window_size: usize, gains: GainTriple) -> ControlEngine<MemoryStore, StdRng> {
        ControlEngine::with_rng(
            &config(window_size),
            MemoryStore::default(),
            gains,
            StdRng::seed_from_u64(17),
        )
    }

    fn run_ticks(
        engine: &mut ControlEngine<MemoryStore, StdRng>,
        fan: &mut ScriptedFan,
        ticks: usize,
    ) -> Vec<TickReport> {
        (0..ticks).map(|_| engine.tick(fan).unwrap()).collect()
    }

    #[test]
    fn test_at_target_settles_on_feed_forward() {
        let mut engine = engine(1000, GainTriple::new(5.0, 0.1, 2.0));
        let mut fan = ScriptedFan::with_temperatures([60.0]);

        let reports = run_ticks(&mut engine, &mut fan, 100);

        assert!(reports.iter().all(|r| r.error == 0.0 && r.level == 20));
        assert_eq!(engine.pid().state().integral_error, 0.0);
        assert_eq!(fan.writes, vec![20], "unchanged level is written once");
    }

    #[test]
    fn test_unchanged_level_is_not_rewritten() {
        let mut engine = engine(1000, GainTriple::new(5.0, 0.0, 0.0));
        let mut fan = ScriptedFan::with_temperatures([65.0, 65.0, 65.0, 61.0, 61.0]);

        run_ticks(&mut engine, &mut fan, 5);

        // 20 + 5*8 + 5*5 = 85, then 20 + 8 + 5 = 33
        assert_eq!(fan.writes, vec![85, 33]);
        assert_eq!(engine.applied_level(), Some(33));
    }

    #[test]
    fn test_accept_starts_next_experiment_and_revert_restores_kept_gains() {
        let initial = GainTriple::new(5.0, 0.1, 2.0);
        let mut engine = engine(10, initial);
        let temps = std::iter::repeat(65.0)
            .take(10)
            .chain(std::iter::repeat(61.0).take(10))
            .chain(std::iter::repeat(70.0).take(10));
        let mut fan = ScriptedFan::with_temperatures(temps);

        // Ticks 1-10: first window is the baseline of the first experiment
        let reports = run_ticks(&mut engine, &mut fan, 10);
        assert!(reports[..9].iter().all(|r| r.outcome.is_none()));
        let outcome = reports[9].outcome.unwrap();
        assert_eq!(outcome.verdict, None);
        let trial = *engine.gains();
        assert_ne!(trial, initial);

        // Ticks 11-20: cooler, so the trial gain is kept and persisted and the
        // next experiment starts at the same boundary
        let reports = run_ticks(&mut engine, &mut fan, 10);
        let outcome = reports[9].outcome.unwrap();
        assert!(matches!(outcome.verdict, Some(Verdict::Accepted { gains, .. }) if gains == trial));
        assert_eq!(engine.store().stored, Some(trial));
        let record = *engine.tuner().experiment().expect("experiment in flight after accept");
        assert_eq!(record.baseline_gains, trial);
        assert_eq!(record.gain, outcome.started.gain);

        // Tick 21 runs with that record still in flight
        let report = engine.tick(&mut fan).unwrap();
        assert!(report.outcome.is_none());
        assert_eq!(engine.tuner().experiment(), Some(&record));

        // Ticks 22-30: hotter, so every gain returns to the kept values
        let reports = run_ticks(&mut engine, &mut fan, 9);
        let outcome = reports[8].outcome.unwrap();
        assert!(matches!(outcome.verdict, Some(Verdict::Reverted { gain, .. }) if gain == record.gain));
        let next = *engine.tuner().experiment().expect("experiment in flight after revert");
        assert_eq!(next.baseline_gains, trial);
        let untouched: Vec<Gain> = Gain::ALL.into_iter().filter(|g| *g != next.gain).collect();
        assert!(untouched.iter().all(|g| engine.gains().get(*g) == trial.get(*g)));
        assert_eq!(engine.store().stored, Some(trial));
        assert_eq!(engine.store().saves, 1);

        let stats = engine.stats();
        assert_eq!((stats.windows, stats.accepted, stats.reverted), (3, 1, 1));
        assert_eq!(stats.experiments, 3);
    }

    #[test]
    fn test_sustained_overheat_pins_max_level_while_tuning() {
        let mut engine = engine(5, GainTriple::new(5.0, 0.1, 2.0));
        let mut fan = ScriptedFan::with_temperatures([70.0]);

        let reports = run_ticks(&mut engine, &mut fan, 200);

        assert!(reports.iter().all(|r| r.level == 100));
        assert_eq!(fan.writes, vec![100]);
        assert_eq!(engine.stats().experiments, 40);
    }

    #[test]
    fn test_zero_gains_get_explored() {
        let mut engine = engine(4, GainTriple::new(0.0, 0.0, 0.0));
        let mut fan = ScriptedFan::with_temperatures([62.0]);

        run_ticks(&mut engine, &mut fan, 4);
        let record = *engine.tuner().experiment().unwrap();
        assert!(engine.gains().get(record.gain) > 0.0);
        let others: Vec<Gain> = Gain::ALL.into_iter().filter(|g| *g != record.gain).collect();
        assert!(others.iter().all(|g| engine.gains().get(*g) == 0.0));
    }

    #[test]
    fn test_persistence_failure_keeps_running() {
        let mut engine = ControlEngine::with_rng(
            &config(5),
            MemoryStore {
                fail_saves: true,
                ..Default::default()
            },
            GainTriple::new(5.0, 0.1, 2.0),
            StdRng::seed_from_u64(3),
        );
        let temps = std::iter::repeat(66.0)
            .take(5)
            .chain(std::iter::repeat(60.5).take(5));
        let mut fan = ScriptedFan::with_temperatures(temps);

        for _ in 0..10 {
            engine.tick(&mut fan).unwrap();
        }
        assert_eq!(engine.stats().accepted, 1);
        assert_eq!(engine.persistence_failures(), 1);
        let record = engine.tuner().experiment().unwrap();
        assert_ne!(record.baseline_gains, GainTriple::new(5.0, 0.1, 2.0));
    }

    #[test]
    fn test_fatal_store_failure_aborts_tick() {
        let mut engine = ControlEngine::with_rng(
            &config(5),
            MemoryStore {
                fatal_saves: true,
                ..Default::default()
            },
            GainTriple::new(5.0, 0.1, 2.0),
            StdRng::seed_from_u64(3),
        );
        let temps = std::iter::repeat(66.0)
            .take(5)
            .chain(std::iter::repeat(60.5).take(5));
        let mut fan = ScriptedFan::with_temperatures(temps);

        run_ticks(&mut engine, &mut fan, 9);
        let err = engine.tick(&mut fan).unwrap_err();

        assert!(matches!(err, FanError::Privilege(_)));
        assert_eq!(engine.stats().accepted, 1);
        assert_eq!(engine.persistence_failures(), 0);
    }

    #[test]
    fn test_sensor_fault_aborts_tick() {
        let mut engine = engine(10, GainTriple::new(5.0, 0.1, 2.0));
        let mut fan = ScriptedFan::with_temperatures([60.0]);
        fan.fail_read_after = Some(3);

        run_ticks(&mut engine, &mut fan, 3);
        let err = engine.tick(&mut fan).unwrap_err();
        assert!(matches!(err, FanError::SensorRead { .. }));
        assert_eq!(engine.ticks(), 3);
    }

    #[test]
    fn test_tuning_on_simulated_rig_holds_temperature() {
        use crate::hardware::{CoolingRig, SimulatedFan};

        // Uncontrolled at the minimum level this rig settles near 91°C
        let rig = CoolingRig::new(25.0, 25.0, 400.0, 60.0, 0.4, 2.5);
        let mut fan = SimulatedFan::new(rig, vec![("cpu".to_string(), 0.0)]);
        let mut config = config(30);
        config.cost = CostWeights::default();
        let mut engine = ControlEngine::with_rng(
            &config,
            MemoryStore::default(),
            config.default_gains(),
            StdRng::seed_from_u64(99),
        );

        let mut manual = ManualMode::engage(&mut fan).unwrap();
        let mut reports = Vec::new();
        for _ in 0..7200 {
            reports.push(engine.tick(&mut *manual).unwrap());
            for _ in 0..10 {
                manual.advance(0.1);
            }
        }
        manual.release().unwrap();

        assert!(reports.iter().all(|r| (20..=100).contains(&r.level)));
        let tail = &reports[reports.len() - 300..];
        let mean = tail.iter().map(|r| r.temperature).sum::<f32>() / tail.len() as f32;
        assert!((45.0..70.0).contains(&mean), "mean temperature {}", mean);
        assert_eq!(engine.stats().windows, 240);
        let gains = engine.gains();
        assert!(gains.kp >= 0.0 && gains.ki >= 0.0 && gains.kd >= 0.0);
    }

    fn daemon(fan: ScriptedFan) -> Daemon<ScriptedFan, MemoryStore, StdRng> {
        Daemon::new(fan, engine(5, GainTriple::new(5.0, 0.1, 2.0)), Duration::from_millis(1))
    }

    #[test]
    fn test_fault_still_persists_and_restores() {
        let mut fan = ScriptedFan::with_temperatures([63.0]);
        fan.fail_read_after = Some(12);
        let mut daemon = daemon(fan);

        let err = daemon.run(&AtomicBool::new(false)).unwrap_err();

        assert!(matches!(err, FanError::SensorRead { .. }));
        assert_eq!(daemon.engine().ticks(), 12);
        assert_eq!(daemon.engine().store().stored, Some(*daemon.engine().gains()));
        assert_eq!(daemon.hardware().mode_switches, vec!["manual", "automatic"]);
        assert!(!daemon.hardware().manual);
    }

    #[test]
    fn test_stop_signal_ends_loop_cleanly() {
        let stop = Arc::new(AtomicBool::new(false));
        let setter = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                stop.store(true, Ordering::Release);
            })
        };
        let mut daemon = daemon(ScriptedFan::with_temperatures([60.0]));

        daemon.run(&stop).unwrap();
        setter.join().unwrap();

        assert!(daemon.engine().ticks() > 0);
        assert_eq!(daemon.engine().store().saves, 1);
        assert_eq!(daemon.hardware().mode_switches, vec!["manual", "automatic"]);
    }

    #[test]
    fn test_privilege_failure_touches_no_hardware() {
        let mut fan = ScriptedFan::with_temperatures([60.0]);
        fan.privileged = false;
        let mut daemon = daemon(fan);

        let err = daemon.run(&AtomicBool::new(false)).unwrap_err();

        assert!(matches!(err, FanError::Privilege(_)));
        assert!(daemon.hardware().mode_switches.is_empty());
        assert_eq!(daemon.hardware().reads, 0);
        assert_eq!(daemon.engine().store().saves, 0);
    }
}
