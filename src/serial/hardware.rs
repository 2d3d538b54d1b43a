use std::hint;
use std::time::{
	Duration,
	Instant,
};

/// Identifier of a single digital line; what it means is up to the
/// `Hardware` implementation (a GPIO number for sysfs).
pub type Pin = u32;

// spin instead of sleeping: the scheduler can't do single microseconds
pub fn busy_delay(duration: Duration) {
	let start = Instant::now();
	while start.elapsed() < duration {
		hint::spin_loop();
	}
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Input,
	Output,
}

/// Pin assignment; DI and DO are named from the chip's point of view,
/// i.e. we drive `data_in` and sample `data_out`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Pins {
	pub chip_select: Pin,
	pub clock: Pin,
	pub data_in: Pin,
	pub data_out: Pin,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Timing {
	/// delay around each clock edge
	pub clock_delay_us: u32,
	/// how long to poll for the end of a write/erase cycle
	pub completion_timeout: Duration,
}

impl Default for Timing {
	fn default() -> Self {
		// datasheets give 10ms as worst case for ERAL/WRAL on older parts
		Timing {
			clock_delay_us: 1,
			completion_timeout: Duration::from_millis(25),
		}
	}
}

pub trait Hardware {
	fn configure(&mut self, pin: Pin, direction: Direction) -> crate::AResult<()>;
	fn write_pin(&mut self, pin: Pin, high: bool) -> crate::AResult<()>;
	fn read_pin(&mut self, pin: Pin) -> crate::AResult<bool>;

	fn delay_us(&mut self, us: u32) {
		busy_delay(Duration::from_micros(us as u64));
	}
}

impl<'a, H: ?Sized + Hardware> Hardware for &'a mut H {
	fn configure(&mut self, pin: Pin, direction: Direction) -> crate::AResult<()> {
		H::configure(*self, pin, direction)
	}
	fn write_pin(&mut self, pin: Pin, high: bool) -> crate::AResult<()> {
		H::write_pin(*self, pin, high)
	}
	fn read_pin(&mut self, pin: Pin) -> crate::AResult<bool> {
		H::read_pin(*self, pin)
	}
	fn delay_us(&mut self, us: u32) {
		H::delay_us(*self, us)
	}
}
