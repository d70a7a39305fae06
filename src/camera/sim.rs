//! Simulated camera links.
//!
//! These links stand in for the vendor SDKs during development and in the
//! test suite: a producer thread models the sensor, delivering synthetic
//! sample grids into a bounded frame queue at the configured rate. The
//! queue and the thread are constructed by `open()`/`start_stream()` and
//! torn down by `close()`, exactly like a hardware link would manage its
//! reader context.
//!
//! Fault injection is deliberate and seeded so failure scenarios are
//! reproducible: a link can refuse its first N opens (device warming up),
//! withhold every Nth frame (grab timeout), or die after a frame count
//! (fatal device error).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::data::Image;
use crate::device::{CameraControl, CameraLink, CaptureConfig, Grab, LinkInfo};
use crate::error::{AppResult, CamError};

/// Sensor family a simulated link models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimSensor {
    /// Raw centikelvin counts, 16 bits per sample.
    Thermal,
    /// 8-bit grayscale plane.
    Mono,
}

/// Configuration of a simulated link.
#[derive(Debug, Clone)]
pub struct SimLinkConfig {
    /// Sensor family.
    pub sensor: SimSensor,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Delivery rate in frames per second.
    pub frame_rate_fps: f64,
    /// Bounded frame-queue depth; frames are dropped when full.
    pub queue_depth: usize,
    /// Seed for the noise generator; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Refuse this many `open()` calls with a recoverable error first.
    pub fail_opens: u32,
    /// Withhold every Nth frame so the consumer sees a timeout.
    pub drop_every: Option<u64>,
    /// Stop producing (and drop the queue) after this many frames,
    /// surfacing a fatal device error to the consumer.
    pub die_after: Option<u64>,
}

impl SimLinkConfig {
    /// Geometry and rate of the thermal sensor this crate models.
    pub fn thermal() -> Self {
        Self {
            sensor: SimSensor::Thermal,
            width: 160,
            height: 120,
            frame_rate_fps: 8.7,
            queue_depth: 2,
            seed: None,
            fail_opens: 0,
            drop_every: None,
            die_after: None,
        }
    }

    /// A default machine-vision sensor.
    pub fn vision() -> Self {
        Self {
            sensor: SimSensor::Mono,
            width: 640,
            height: 480,
            frame_rate_fps: 30.0,
            queue_depth: 2,
            seed: None,
            fail_opens: 0,
            drop_every: None,
            die_after: None,
        }
    }
}

struct SimStream {
    stop: Arc<AtomicBool>,
    rx: Receiver<Image>,
    producer: Option<JoinHandle<()>>,
}

/// A [`CameraLink`] backed by a synthetic sensor model.
pub struct SimCameraLink {
    cfg: SimLinkConfig,
    opened: bool,
    opens_rejected: u32,
    stream: Option<SimStream>,
    shutter_manual: bool,
    gain_high: bool,
    ffc_runs: u32,
}

impl SimCameraLink {
    /// Build a link from its configuration.
    pub fn new(cfg: SimLinkConfig) -> Self {
        Self {
            cfg,
            opened: false,
            opens_rejected: 0,
            stream: None,
            shutter_manual: false,
            gain_high: false,
            ffc_runs: 0,
        }
    }

    /// Whether the FFC shutter is under manual control.
    pub fn shutter_manual(&self) -> bool {
        self.shutter_manual
    }

    /// Number of flat-field corrections run so far.
    pub fn ffc_runs(&self) -> u32 {
        self.ffc_runs
    }

    /// Whether the high-gain sensor mode was selected.
    pub fn gain_high(&self) -> bool {
        self.gain_high
    }

    fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.cfg.frame_rate_fps)
    }
}

impl CameraLink for SimCameraLink {
    fn info(&self) -> LinkInfo {
        let model = match self.cfg.sensor {
            SimSensor::Thermal => "sim-thermal",
            SimSensor::Mono => "sim-mono",
        };
        LinkInfo {
            model: model.to_string(),
            serial: Some("SIM-0001".to_string()),
        }
    }

    fn open(&mut self) -> AppResult<()> {
        if self.opens_rejected < self.cfg.fail_opens {
            self.opens_rejected += 1;
            return Err(CamError::DeviceUnavailable(
                "simulated device is busy".to_string(),
            ));
        }
        self.opened = true;
        Ok(())
    }

    fn configure(&mut self, cfg: &CaptureConfig) -> AppResult<()> {
        if !self.opened {
            return Err(CamError::NotOpen);
        }
        if self.stream.is_some() {
            return Err(CamError::ConfigureWhileStreaming);
        }
        if cfg.frame_rate_fps <= 0.0 {
            return Err(CamError::Configuration(
                "frame rate must be positive".to_string(),
            ));
        }
        self.cfg.frame_rate_fps = cfg.frame_rate_fps;
        self.cfg.width = cfg.width;
        self.cfg.height = cfg.height;
        Ok(())
    }

    fn start_stream(&mut self) -> AppResult<()> {
        if !self.opened {
            return Err(CamError::NotOpen);
        }
        if self.stream.is_some() {
            return Ok(());
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(self.cfg.queue_depth);
        let stop = Arc::new(AtomicBool::new(false));
        let producer = spawn_producer(self.cfg.clone(), tx, Arc::clone(&stop));

        self.stream = Some(SimStream {
            stop,
            rx,
            producer: Some(producer),
        });
        Ok(())
    }

    fn recv_frame(&mut self, timeout: Duration) -> Grab {
        let Some(stream) = self.stream.as_ref() else {
            return Grab::Fault(CamError::NotOpen);
        };
        match stream.rx.recv_timeout(timeout) {
            Ok(image) => Grab::Image(image),
            Err(RecvTimeoutError::Timeout) => Grab::Timeout,
            Err(RecvTimeoutError::Disconnected) => {
                Grab::Fault(CamError::DeviceFault("simulated link lost".to_string()))
            }
        }
    }

    fn control(&mut self, ctl: CameraControl) -> AppResult<()> {
        if !self.opened {
            return Err(CamError::NotOpen);
        }
        match ctl {
            CameraControl::ShutterManual => self.shutter_manual = true,
            CameraControl::ShutterAuto => self.shutter_manual = false,
            CameraControl::FlatFieldCorrection => self.ffc_runs += 1,
            CameraControl::GainHigh => self.gain_high = true,
        }
        Ok(())
    }

    fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = stream.producer.take() {
                let _ = handle.join();
            }
        }
    }

    fn close(&mut self) {
        self.stop_stream();
        self.opened = false;
    }
}

fn spawn_producer(
    cfg: SimLinkConfig,
    tx: SyncSender<Image>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut rng = match cfg.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let interval = Duration::from_secs_f64(1.0 / cfg.frame_rate_fps);
        let mut produced: u64 = 0;
        let mut deadline = Instant::now();

        loop {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            if let Some(limit) = cfg.die_after {
                if produced >= limit {
                    // Dropping the sender severs the queue; the consumer
                    // observes a fatal device error.
                    return;
                }
            }

            produced += 1;
            let withheld = cfg
                .drop_every
                .is_some_and(|n| n > 0 && produced % n == 0);
            if !withheld {
                let image = synth_image(&cfg, produced, &mut rng);
                match tx.try_send(image) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }

            deadline += interval;
            if !sleep_until(deadline, &stop) {
                return;
            }
        }
    })
}

/// Sleep in short slices until `deadline`, returning false when stopped.
fn sleep_until(deadline: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let remaining = deadline - now;
        std::thread::sleep(remaining.min(Duration::from_millis(5)));
    }
}

fn synth_image(cfg: &SimLinkConfig, seq: u64, rng: &mut ChaCha8Rng) -> Image {
    let (w, h) = (cfg.width, cfg.height);
    match cfg.sensor {
        SimSensor::Thermal => {
            // Roughly 30 degrees Celsius with a drifting gradient and
            // sensor noise, in raw centikelvin counts.
            let mut raw = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                for x in 0..w {
                    let gradient = ((x + y + seq as u32) % 128) as u16;
                    let noise: u16 = rng.gen_range(0..25);
                    raw.push(30315 + gradient + noise);
                }
            }
            Image::from_mono16(w, h, raw)
        }
        SimSensor::Mono => {
            let mut data = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                for x in 0..w {
                    let base = ((x + y + seq as u32) % 200) as u8;
                    let noise: u8 = rng.gen_range(0..32);
                    data.push(base.saturating_add(noise));
                }
            }
            Image::from_mono8(w, h, data)
        }
    }
}
