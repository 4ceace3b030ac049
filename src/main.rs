#![no_main]
#![no_std]

use panic_probe as _;
use defmt_rtt as _;
use stm32f0xx_hal as hal;
use wirechat as lib;

#[rtic::app(device = crate::hal::pac, dispatchers = [CEC_CAN, USART3_4])]
mod app {
    use cortex_m::interrupt::free as ifree;
    use super::hal;
    use hal::prelude::*;

    use super::lib;
    use lib::bsp::{self, console::Console, debug::DebugGpio};
    use lib::config::{CONFIG, SEND_QUEUE_SLOTS, RECEIVE_QUEUE_SLOTS};
    use lib::link::{self, Backoff, Link, Driver, Mode, PacketQueue, Stats, OpenDrainLine};
    use lib::chat::{self, LineEditor};
    use lib::utils::{self, Divider, InfallibleResult};

    type Outbound = PacketQueue<SEND_QUEUE_SLOTS>;
    type Inbound = PacketQueue<RECEIVE_QUEUE_SLOTS>;
    type AppLink = Link<'static, SEND_QUEUE_SLOTS, RECEIVE_QUEUE_SLOTS>;
    type LinkDriver = Driver<'static, bsp::WireLine, SEND_QUEUE_SLOTS, RECEIVE_QUEUE_SLOTS>;

    macro_rules! dbg {
        (@frame, $dbg:expr, $mode:expr) => { $dbg.set_frame_mark($mode != Mode::Idle) };
        (@with_mark, $dbg:expr, $call:expr) => { $dbg.with_tick_mark($call) };
    }

    #[shared]
    struct Shared {
        dbg: DebugGpio,
    }

    #[local]
    struct Local {
        timer: hal::timers::Timer<hal::pac::TIM15>,
        driver: LinkDriver,
        report: Divider,
        link: AppLink,
        console: Console,
    }

    #[init(local = [
        outbound: Outbound = PacketQueue::new(),
        inbound: Inbound = PacketQueue::new(),
    ])]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let mut dev = cx.device;

        let mut rcc = dev.RCC
            .configure()
            .hsi48()
            .sysclk(hal::time::Hertz(bsp::SYSCLK_HZ))
            .pclk(hal::time::Hertz(bsp::PCLK_HZ))
            .freeze(&mut dev.FLASH);

        // Pinout
        let gpioa = dev.GPIOA.split(&mut rcc);
        let gpiob = dev.GPIOB.split(&mut rcc);

        // Shared wire, starts released
        let wire = ifree(|cs| gpioa.pa8.into_open_drain_output(cs).internal_pull_up(cs, true));
        let (link, driver) = link::split(OpenDrainLine::new(wire), cx.local.outbound, cx.local.inbound);

        // Console
        let console_tx = ifree(|cs| gpioa.pa2.into_alternate_af1(cs));
        let console_rx = ifree(|cs| gpioa.pa3.into_alternate_af1(cs));
        let console = Console::new(dev.USART2, (console_tx, console_rx), &mut rcc);

        let dbg = ifree(|cs| DebugGpio::new(
            gpiob.pb0.into_push_pull_output(cs),
            gpiob.pb1.into_push_pull_output(cs),
        ));

        // Bit timer, one engine tick per bit time
        let mut timer = hal::timers::Timer::tim15(dev.TIM15, hal::time::Hertz(CONFIG.bit_rate), &mut rcc);
        timer.listen(hal::timers::Event::TimeOut);

        defmt::info!("Node {=u8} on line at {=u32} bit/s", CONFIG.node.get(), CONFIG.bit_rate);
        defmt::debug!("Size of: driver={=usize} link={=usize}",
            core::mem::size_of::<LinkDriver>(),
            core::mem::size_of::<AppLink>(),
        );

        let shared = Shared { dbg };

        let local = Local {
            timer,
            driver,
            // once per second worth of ticks
            report: Divider::new(CONFIG.bit_rate),
            link,
            console,
        };

        (shared, local, init::Monotonics())
    }

    #[task(binds = TIM15, priority = 4, shared = [&dbg], local = [timer, driver, report])]
    fn tick(cx: tick::Context) {
        // Clears interrupt flag
        if cx.local.timer.wait().is_ok() {
            let driver = cx.local.driver;
            dbg!(@with_mark, cx.shared.dbg, || driver.tick());
            dbg!(@frame, cx.shared.dbg, driver.mode());

            if cx.local.report.tick() {
                if stats_report::spawn(*driver.stats()).is_err() {
                    defmt::warn!("Spawn failed: stats_report");
                }
            }
        }
    }

    #[task(priority = 1, capacity = 1, local = [last: Option<Stats> = None])]
    fn stats_report(cx: stats_report::Context, stats: Stats) {
        let last = cx.local.last.get_or_insert_with(Default::default);
        if &stats != last {
            defmt::info!("Link stats: {}", stats);
            *last = stats;
        }
    }

    #[idle(local = [link, console, editor: LineEditor = LineEditor::new()])]
    fn idle(cx: idle::Context) -> ! {
        let idle::LocalResources { link, console, editor, .. } = cx.local;
        let poll_cycles = utils::cycles_per_ms(bsp::SYSCLK_HZ, CONFIG.poll_interval_ms);
        let mut backoff = || cortex_m::asm::delay(poll_cycles);

        loop {
            if let Some(byte) = console.read() {
                // echo typed characters
                console.write_bytes(&[byte]);
                if let Some(line) = editor.push(byte) {
                    console.write_bytes(b"\r\n");
                    send_line(link, &line, &mut backoff);
                }
            }

            if link.has_packet() {
                let packet = link.get_packet(&mut backoff);
                match chat::accept(&packet, CONFIG.node) {
                    Some(message) => {
                        defmt::info!("Message {}", message);
                        ufmt::uwrite!(console, "{}", message).infallible();
                    },
                    None => defmt::trace!("Ignoring {}", packet),
                }
            }
        }
    }

    fn send_line(link: &mut AppLink, line: &str, backoff: &mut impl Backoff) {
        let Some((destination, text)) = chat::parse_line(line) else {
            defmt::warn!("Expected \"N: message\", got {=str}", line);
            return;
        };
        match chat::compose(CONFIG.node, destination, text) {
            Some(packet) => {
                defmt::debug!("Sending {}", packet);
                link.send_packet(&packet, backoff);
            },
            None => defmt::warn!("Invalid destination {=u8}", destination),
        }
    }
}
