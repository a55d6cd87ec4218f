//! Core 1: the audio loop and its two interrupts.
//!
//! A PWM slice that never drives a pin is used as the sample rate timer.
//! Its wrap interrupt sends the waiting sample to the DAC and sets the
//! brightness of the onboard LED to match, and the gate input interrupt posts
//! note starts and stops.  Both are handled on core 1, the
//! same core as the audio loop.

use embedded_hal::blocking::spi::Write;
use embedded_hal::digital::v2::OutputPin;
use embedded_hal::PwmPin;
use rp_pico::hal::fugit::RateExtU32;
use rp_pico::hal::gpio::bank0::{Gpio16, Gpio17, Gpio18, Gpio19, Gpio20, Gpio25};
use rp_pico::hal::gpio::{
    FunctionNull, FunctionSioInput, FunctionSioOutput, FunctionSpi, Interrupt, Pin, PullDown,
    PullNone,
};
use rp_pico::hal::pac::{self, interrupt};
use rp_pico::hal::{self, pwm, Clock};

use dexy::dac::{led_level, mcp4821_command, sample_to_dac, DacUnit};
use dexy::pipeline::AudioOutput;
use dexy::sync::CritSecCell;
use dexy::Synth;

use crate::{CONTROL, PIPELINE};

// 125 MHz / (1 + 10/16) / (1564 + 1) = 49152.13 Hz
const PWM_TOP: u16 = 1564;
const PWM_DIV_INT: u8 = 1;
const PWM_DIV_FRAC: u8 = 10;

const SPI_BAUD_HZ: u32 = 20_000_000;

// The LED slice counts the full 16 bits at the system clock
const LED_PWM_TOP: u16 = u16::MAX;

type DacSpi = hal::Spi<
    hal::spi::Enabled,
    pac::SPI0,
    (Pin<Gpio19, FunctionSpi, PullDown>, Pin<Gpio18, FunctionSpi, PullDown>),
    16,
>;

/// The gate input pin
pub type GatePin = Pin<Gpio16, FunctionSioInput, PullNone>;

/// Pins used by the audio hardware
pub struct AudioPins {
    pub spi_tx: Pin<Gpio19, FunctionSpi, PullDown>,
    pub spi_sck: Pin<Gpio18, FunctionSpi, PullDown>,
    pub dac_cs: Pin<Gpio17, FunctionSioOutput, PullDown>,
    pub dac_ldac: Pin<Gpio20, FunctionSioOutput, PullDown>,
    pub gate: GatePin,
    pub led: Pin<Gpio25, FunctionNull, PullDown>,
}

dexy::lock_tag!(AudioHwLock, 2);
dexy::lock_tag!(GateLock, 3);

struct AudioHw {
    timer: pwm::Slice<pwm::Pwm0, pwm::FreeRunning>,
    spi: DacSpi,
    cs: Pin<Gpio17, FunctionSioOutput, PullDown>,
    ldac: Pin<Gpio20, FunctionSioOutput, PullDown>,
    led: pwm::Slice<pwm::Pwm4, pwm::FreeRunning>,
}

impl AudioOutput for AudioHw {
    fn set_output(&mut self, value: u16) {
        // LDAC high while the word is shifted in, then low to latch it
        self.ldac.set_high().ok();
        self.cs.set_low().ok();
        self.spi.write(&[mcp4821_command(value, DacUnit::A)]).ok();
        self.cs.set_high().ok();
        self.ldac.set_low().ok();
        self.led.channel_b.set_duty(led_level(value));
    }
}

static AUDIO_HW: CritSecCell<Option<AudioHw>, AudioHwLock> = CritSecCell::new(None);
static GATE_PIN: CritSecCell<Option<GatePin>, GateLock> = CritSecCell::new(None);

/// Set up the DAC, the sample rate timer and the gate input.  Interrupts stay
/// masked until [run] starts on core 1.
pub fn init(
    pins: AudioPins,
    pwm: pac::PWM,
    spi: pac::SPI0,
    resets: &mut pac::RESETS,
    clocks: &hal::clocks::ClocksManager,
) {
    let spi = hal::Spi::<_, _, _, 16>::new(spi, (pins.spi_tx, pins.spi_sck)).init(
        resets,
        clocks.peripheral_clock.freq(),
        SPI_BAUD_HZ.Hz(),
        embedded_hal::spi::MODE_0,
    );
    let slices = pwm::Slices::new(pwm, resets);
    let mut hw = AudioHw {
        timer: slices.pwm0,
        spi,
        cs: pins.dac_cs,
        ldac: pins.dac_ldac,
        led: slices.pwm4,
    };
    hw.led.set_top(LED_PWM_TOP);
    hw.led.set_div_int(1);
    hw.led.channel_b.output_to(pins.led);
    hw.led.enable();
    hw.cs.set_high().ok();
    hw.set_output(sample_to_dac(0));
    hw.timer.set_top(PWM_TOP);
    hw.timer.set_div_int(PWM_DIV_INT);
    hw.timer.set_div_frac(PWM_DIV_FRAC);
    hw.timer.enable_interrupt();
    hw.timer.enable();
    AUDIO_HW.with(|slot| *slot = Some(hw));

    let gate = pins.gate;
    gate.set_interrupt_enabled(Interrupt::EdgeHigh, true);
    gate.set_interrupt_enabled(Interrupt::EdgeLow, true);
    GATE_PIN.with(|slot| *slot = Some(gate));
}

/// The audio loop, run on core 1
pub fn run() -> ! {
    let mut synth = Synth::new(&CONTROL);
    // Safety: the handlers below only touch state behind their own locks
    unsafe {
        pac::NVIC::unmask(pac::Interrupt::PWM_IRQ_WRAP);
        pac::NVIC::unmask(pac::Interrupt::IO_IRQ_BANK0);
    }
    loop {
        let sample = synth.next_sample();
        PIPELINE.publish(sample_to_dac(sample));
    }
}

#[interrupt]
fn PWM_IRQ_WRAP() {
    AUDIO_HW.with(|hw| {
        if let Some(hw) = hw {
            hw.timer.clear_interrupt();
            PIPELINE.on_timer(hw, CONTROL.errors());
        }
    });
}

#[interrupt]
fn IO_IRQ_BANK0() {
    GATE_PIN.with(|gate| {
        let Some(gate) = gate else {
            CONTROL.errors().set(dexy::ErrorKind::WrongIrqGpio);
            return;
        };
        let rising = gate.interrupt_status(Interrupt::EdgeHigh);
        let falling = gate.interrupt_status(Interrupt::EdgeLow);
        gate.clear_interrupt(Interrupt::EdgeHigh);
        gate.clear_interrupt(Interrupt::EdgeLow);
        CONTROL.on_gate_irq(rising, falling);
    });
}
