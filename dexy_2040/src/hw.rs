//! Core 0 glue between the hardware and the engine's task scheduler

use embedded_hal::adc::OneShot;
use embedded_hal::watchdog::Watchdog as _;
use rp_pico::hal::adc::AdcPin;
use rp_pico::hal::gpio::bank0::{Gpio26, Gpio27};
use rp_pico::hal::gpio::{FunctionSioInput, Pin, PullNone};
use rp_pico::hal::{self, Adc};

use dexy::cv::ControlInputs;
use dexy::tasks::{Clock, CoreTask, Task, Watchdog};

/// How often the control voltages are read
pub const CV_INTERVAL_US: u64 = 500;

/// The free running microsecond timer
pub struct TimerClock(pub hal::Timer);

impl Clock for TimerClock {
    fn now_micros(&self) -> u64 {
        self.0.get_counter().ticks()
    }
}

/// The chip's watchdog
pub struct HwWatchdog(pub hal::Watchdog);

impl Watchdog for HwWatchdog {
    fn feed(&mut self) {
        self.0.feed();
    }
}

type CvPin<P> = AdcPin<Pin<P, FunctionSioInput, PullNone>>;

/// Reads the pitch and timbre inputs
pub struct CvTask<'a> {
    adc: Adc,
    pitch: CvPin<Gpio26>,
    timbre: CvPin<Gpio27>,
    inputs: ControlInputs<'a>,
}

impl<'a> CvTask<'a> {
    pub fn new(
        adc: Adc,
        pitch: CvPin<Gpio26>,
        timbre: CvPin<Gpio27>,
        control: &'a dexy::SynthControl,
    ) -> Self {
        Self {
            adc,
            pitch,
            timbre,
            inputs: ControlInputs::new(control),
        }
    }
}

impl Task for CvTask<'_> {
    fn interval_micros(&self) -> u64 {
        CV_INTERVAL_US
    }
    fn execute(&mut self, _now: u64) {
        let pitch: Result<u16, _> = self.adc.read(&mut self.pitch);
        let timbre: Result<u16, _> = self.adc.read(&mut self.timbre);
        self.inputs.update_from(pitch, timbre);
    }
}

/// Everything core 0 runs
pub enum FirmwareTask<'a> {
    Core(CoreTask<'a, HwWatchdog>),
    Cv(CvTask<'a>),
}

impl Task for FirmwareTask<'_> {
    fn interval_micros(&self) -> u64 {
        match self {
            Self::Core(t) => t.interval_micros(),
            Self::Cv(t) => t.interval_micros(),
        }
    }
    fn init(&mut self, now: u64) {
        match self {
            Self::Core(t) => t.init(now),
            Self::Cv(t) => t.init(now),
        }
    }
    fn execute(&mut self, now: u64) {
        match self {
            Self::Core(t) => t.execute(now),
            Self::Cv(t) => t.execute(now),
        }
    }
}
