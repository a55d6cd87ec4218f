#![no_std]
#![no_main]

use embedded_hal::watchdog::WatchdogEnable;
use panic_halt as _;
use rp_pico::entry;
use rp_pico::hal::fugit::ExtU32;
use rp_pico::hal::multicore::{Multicore, Stack};
use rp_pico::hal::{self, pac};

use dexy::pipeline::AudioPipeline;
use dexy::tasks::{CoreTask, GateNotifier, ReportErrors, TaskScheduler, WatchdogTask};
use dexy::{ErrorKind, SynthControl};

mod audio;
mod hw;

use hw::FirmwareTask;

/// Everything shared between the cores
pub static CONTROL: SynthControl = SynthControl::new();
/// Samples on their way from the audio loop to the DAC
pub static PIPELINE: AudioPipeline = AudioPipeline::new();

static mut CORE1_STACK: Stack<4096> = Stack::new();

const NUM_TASKS: usize = 4;

/// Long enough to ride out a flash write, short enough to catch a hang
const WATCHDOG_PERIOD_US: u32 = 500_000;

fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

#[entry]
fn start() -> ! {
    let Some(mut pac) = pac::Peripherals::take() else {
        halt()
    };
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let Ok(clocks) = hal::clocks::init_clocks_and_plls(
        rp_pico::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    ) else {
        halt()
    };
    let mut sio = hal::Sio::new(pac.SIO);
    let pins = rp_pico::Pins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);
    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);

    audio::init(
        audio::AudioPins {
            spi_tx: pins.gpio19.into_function(),
            spi_sck: pins.gpio18.into_function(),
            dac_cs: pins.gpio17.into_push_pull_output(),
            dac_ldac: pins.gpio20.into_push_pull_output(),
            gate: pins.gpio16.into_floating_input(),
            led: pins.led,
        },
        pac.PWM,
        pac.SPI0,
        &mut pac.RESETS,
        &clocks,
    );

    let mut mc = Multicore::new(&mut pac.PSM, &mut pac.PPB, &mut sio.fifo);
    let cores = mc.cores();
    // Safety: the stack is handed to core 1 once and never touched again here
    let stack = unsafe { &mut (*core::ptr::addr_of_mut!(CORE1_STACK)).mem };
    if cores[1].spawn(stack, || audio::run()).is_err() {
        CONTROL.errors().set(ErrorKind::WrongCore);
    }

    let adc = hal::Adc::new(pac.ADC, &mut pac.RESETS);
    let pitch = hal::adc::AdcPin::new(pins.gpio26.into_floating_input());
    let timbre = hal::adc::AdcPin::new(pins.gpio27.into_floating_input());

    watchdog.start(WATCHDOG_PERIOD_US.micros());
    let errors = CONTROL.errors();
    let mut tasks = TaskScheduler::<FirmwareTask, NUM_TASKS>::new();
    let all = [
        FirmwareTask::Cv(hw::CvTask::new(adc, pitch, timbre, &CONTROL)),
        FirmwareTask::Core(CoreTask::ReportErrors(ReportErrors::new(errors))),
        FirmwareTask::Core(CoreTask::GateNotifier(GateNotifier::new(CONTROL.gate_started()))),
        // last, so it sees how long a whole pass takes
        FirmwareTask::Core(CoreTask::Watchdog(WatchdogTask::new(hw::HwWatchdog(watchdog), errors))),
    ];
    for task in all {
        if tasks.add(task).is_err() {
            errors.set(ErrorKind::BadArgument);
        }
    }
    tasks.run(hw::TimerClock(timer))
}
