use core::convert::Infallible;

/// Helper trait to resolve Infallible Results
pub trait InfallibleResult<T> {
    fn infallible(self) -> T;
}

impl<T> InfallibleResult<T> for Result<T, Infallible> {
    fn infallible(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => match e {},
        }
    }
}

/// Number of core clock cycles in `ms` milliseconds, saturating
pub const fn cycles_per_ms(sysclk_hz: u32, ms: u32) -> u32 {
    (sysclk_hz / 1000).saturating_mul(ms)
}

/// Returns true every `period` calls
#[derive(Debug, Clone, Copy)]
pub struct Divider {
    period: u32,
    count: u32,
}

impl Divider {
    pub const fn new(period: u32) -> Self {
        Self { period, count: 0 }
    }

    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.period {
            self.count = 0;
            true
        } else {
            false
        }
    }
}
