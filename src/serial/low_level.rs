use std::time::Instant;

use super::{
	Direction,
	EepromError,
	Frame,
	Hardware,
	Pins,
	Timing,
};

pub struct Bus<H: Hardware> {
	hardware: H,
	pins: Pins,
	timing: Timing,
}

impl<H: Hardware> Bus<H> {
	// CS, SK and DI are ours, DO belongs to the chip
	pub fn new(mut hardware: H, pins: Pins, timing: Timing) -> crate::AResult<Self> {
		hardware.configure(pins.chip_select, Direction::Output)?;
		hardware.configure(pins.clock, Direction::Output)?;
		hardware.configure(pins.data_in, Direction::Output)?;
		hardware.configure(pins.data_out, Direction::Input)?;

		Ok(Bus {
			hardware,
			pins,
			timing,
		})
	}

	pub fn hardware(&self) -> &H {
		&self.hardware
	}

	pub fn hardware_mut(&mut self) -> &mut H {
		&mut self.hardware
	}

	pub fn into_inner(self) -> H {
		self.hardware
	}

	pub fn pins(&self) -> Pins {
		self.pins
	}

	pub fn timing(&self) -> Timing {
		self.timing
	}

	pub fn set_timing(&mut self, timing: Timing) {
		self.timing = timing;
	}

	fn delay(&mut self) {
		let us = self.timing.clock_delay_us;
		self.hardware.delay_us(us);
	}

	fn set_chip_select(&mut self, active: bool) -> crate::AResult<()> {
		self.hardware.write_pin(self.pins.chip_select, active)
	}

	fn data_out(&mut self) -> crate::AResult<bool> {
		self.hardware.read_pin(self.pins.data_out)
	}

	// raise CS; everything clocked until the transaction ends is one instruction
	pub fn select(&mut self) -> crate::AResult<Transaction<H>> {
		self.set_chip_select(true)?;
		Ok(Transaction {
			bus: self,
			finished: false,
		})
	}

	// the chip starts its self-timed programming cycle when CS drops after
	// the instruction; with CS up again it pulls DO low while BUSY and
	// releases it to HIGH when READY.
	pub fn wait_for_completion(&mut self) -> crate::AResult<()> {
		self.delay();
		self.set_chip_select(true)?;

		let timeout = self.timing.completion_timeout;
		let start = Instant::now();
		let result = loop {
			match self.data_out() {
				Err(e) => break Err(e),
				Ok(true) => break Ok(()),
				Ok(false) => (),
			}
			if start.elapsed() > timeout {
				debug!("chip didn't become ready within {:?}", timeout);
				break Err(EepromError::CompletionTimeout { timeout }.into());
			}
			self.delay();
		};

		// always release CS, but report the first error
		let deselect = self.set_chip_select(false);
		result.and(deselect)
	}
}

/// Chip select scope; CS drops when finished or dropped.
pub struct Transaction<'a, H: Hardware + 'a> {
	bus: &'a mut Bus<H>,
	finished: bool,
}

impl<'a, H: Hardware> Transaction<'a, H> {
	// DI is sampled by the chip on the rising SK edge
	pub fn send_bit(&mut self, data: bool) -> crate::AResult<()> {
		let pins = self.bus.pins;
		self.bus.hardware.write_pin(pins.data_in, data)?;
		self.bus.delay();
		self.bus.hardware.write_pin(pins.clock, true)?;
		self.bus.delay();
		self.bus.hardware.write_pin(pins.clock, false)?;
		self.bus.hardware.write_pin(pins.data_in, false)
	}

	// send `width` lowest bits from `value`, starting with highest bit
	pub fn send_bits(&mut self, value: u16, width: u8) -> crate::AResult<()> {
		assert!(width <= 16);
		for bit in (0..width).rev() {
			self.send_bit(0 != value & (1u16 << bit))?;
		}
		Ok(())
	}

	pub fn send_frame(&mut self, frame: &Frame) -> crate::AResult<()> {
		trace!("sending frame {} ({} bits)", frame, frame.len());
		for field in frame.fields() {
			self.send_bits(field.value, field.width)?;
		}
		Ok(())
	}

	// chip shifts the next bit out after the rising SK edge
	pub fn receive_bit(&mut self) -> crate::AResult<bool> {
		let pins = self.bus.pins;
		self.bus.delay();
		self.bus.hardware.write_pin(pins.clock, true)?;
		self.bus.delay();
		let data = self.bus.data_out()?;
		self.bus.hardware.write_pin(pins.clock, false)?;
		Ok(data)
	}

	// read `width` bits, starting with highest bit
	pub fn receive_bits(&mut self, width: u8) -> crate::AResult<u16> {
		assert!(width <= 16);
		let mut result = 0u16;
		for bit in (0..width).rev() {
			if self.receive_bit()? {
				result |= 1u16 << bit;
			}
		}
		Ok(result)
	}

	// after the last address bit of READ the chip drives a 0 on DO; without
	// a chip DO floats (usually pulled up)
	pub fn expect_dummy_bit(&mut self) -> crate::AResult<()> {
		// DO settles only some time after the last SK edge
		self.bus.delay();
		if self.bus.data_out()? {
			return Err(EepromError::MissingDummyBit.into());
		}
		Ok(())
	}

	pub fn data_out(&mut self) -> crate::AResult<bool> {
		self.bus.data_out()
	}

	pub fn finish(mut self) -> crate::AResult<()> {
		self.finished = true;
		self.bus.set_chip_select(false)
	}
}

impl<'a, H: Hardware> Drop for Transaction<'a, H> {
	fn drop(&mut self) {
		if !self.finished {
			if let Err(e) = self.bus.set_chip_select(false) {
				error!("Failed to release chip select: {}", e);
			}
		}
	}
}
