use std::ops::{
	Deref,
	DerefMut,
};

use super::{
	Command,
	EepromError,
	Frame,
	Hardware,
	Organization,
	Pins,
	Timing,
	low_level::{
		Bus,
		Transaction,
	},
};

/// Handle for one 93C46 wired to four pins.
///
/// Every operation runs to completion (including the programming cycle)
/// before it returns. The handle keeps a shadow of the chip's erase/write
/// enable latch and refuses to send write/erase instructions while it is
/// off; callers sharing a handle between threads need to put it behind a
/// `Mutex`.
pub struct Eeprom<H: Hardware> {
	bus: Bus<H>,
	organization: Organization,
	write_enabled: bool,
}

impl<H: Hardware> Eeprom<H> {
	pub fn new(hardware: H, pins: Pins) -> crate::AResult<Self> {
		Self::with_timing(hardware, pins, Timing::default())
	}

	pub fn with_timing(hardware: H, pins: Pins, timing: Timing) -> crate::AResult<Self> {
		Ok(Eeprom {
			bus: Bus::new(hardware, pins, timing)?,
			organization: Organization::default(),
			write_enabled: false,
		})
	}

	/// Must match how the ORG pin of the chip is wired.
	pub fn set_organization(&mut self, organization: Organization) {
		self.organization = organization;
	}

	pub fn organization(&self) -> Organization {
		self.organization
	}

	pub fn pins(&self) -> Pins {
		self.bus.pins()
	}

	pub fn timing(&self) -> Timing {
		self.bus.timing()
	}

	pub fn set_timing(&mut self, timing: Timing) {
		self.bus.set_timing(timing);
	}

	pub fn hardware(&self) -> &H {
		self.bus.hardware()
	}

	pub fn hardware_mut(&mut self) -> &mut H {
		self.bus.hardware_mut()
	}

	pub fn into_inner(self) -> H {
		self.bus.into_inner()
	}

	// instruction without data phase and without programming cycle
	fn send_control(&mut self, command: Command) -> crate::AResult<()> {
		debug!("{}", command);
		let frame = command.frame(self.organization);
		let mut tx = self.bus.select()?;
		tx.send_frame(&frame)?;
		tx.finish()
	}

	fn send_programming(&mut self, command: Command) -> crate::AResult<()> {
		if !self.write_enabled {
			debug!("{} skipped: erase/write disabled", command);
			return Err(EepromError::WriteDisabled { operation: command.name() }.into());
		}

		debug!("{}", command);
		let frame = command.frame(self.organization);
		{
			let mut tx = self.bus.select()?;
			tx.send_frame(&frame)?;
			tx.finish()?;
		}
		self.bus.wait_for_completion()
	}

	pub fn ew_enable(&mut self) -> crate::AResult<()> {
		self.send_control(Command::EraseWriteEnable)?;
		self.write_enabled = true;
		Ok(())
	}

	pub fn ew_disable(&mut self) -> crate::AResult<()> {
		// even if sending fails, don't trust the latch anymore
		self.write_enabled = false;
		self.send_control(Command::EraseWriteDisable)
	}

	pub fn is_ew_enabled(&self) -> bool {
		self.write_enabled
	}

	pub fn erase_all(&mut self) -> crate::AResult<()> {
		self.send_programming(Command::EraseAll)
	}

	// write one value into all cells; chip erases them first
	pub fn write_all(&mut self, value: u16) -> crate::AResult<()> {
		self.send_programming(Command::WriteAll(value))
	}

	pub fn write(&mut self, address: u8, value: u16) -> crate::AResult<()> {
		self.send_programming(Command::Write { address, data: value })
	}

	pub fn erase(&mut self, address: u8) -> crate::AResult<()> {
		self.send_programming(Command::Erase { address })
	}

	pub fn read(&mut self, address: u8) -> crate::AResult<u16> {
		let org = self.organization;
		let frame = Command::Read { address }.frame(org);

		let mut tx = self.bus.select()?;
		tx.send_frame(&frame)?;
		tx.expect_dummy_bit()?;
		let value = tx.receive_bits(org.data_width())?;
		tx.finish()?;

		trace!("READ @{:02x}: {:04x}", address & org.address_mask(), value);
		Ok(value)
	}

	/// Sequential read starting at `address` up to the last cell.
	pub fn reader<'a>(&'a mut self, address: u8) -> crate::AResult<Reader<'a, H>> {
		let org = self.organization;
		let address = address & org.address_mask();
		let frame = Command::Read { address }.frame(org);

		let mut transaction = self.bus.select()?;
		transaction.send_frame(&frame)?;
		transaction.expect_dummy_bit()?;

		Ok(Reader {
			transaction,
			data_width: org.data_width(),
			remaining: org.cells() - address as usize,
		})
	}

	pub fn dump(&mut self) -> crate::AResult<Vec<u16>> {
		self.reader(0)?.collect()
	}

	/// Enables erase/write until the returned guard is dropped.
	pub fn start_programming<'a>(&'a mut self) -> crate::AResult<ProgrammingEnabled<'a, H>> {
		if self.write_enabled {
			return Ok(ProgrammingEnabled {
				eeprom: self,
				disable: false,
			});
		}
		self.ew_enable()?;
		Ok(ProgrammingEnabled {
			eeprom: self,
			disable: true,
		})
	}

	/// Erase the chip, write `image` from address 0 and verify it.
	///
	/// Values are truncated to the data width of the current organization.
	pub fn program(&mut self, image: &[u16]) -> crate::AResult<()> {
		let org = self.organization;
		if image.len() > org.cells() {
			return Err(EepromError::ImageTooLarge { len: image.len(), cells: org.cells() }.into());
		}

		self.erase_all()?;
		for (address, &word) in image.iter().enumerate() {
			self.write(address as u8, word)?;
		}

		let mut reader = self.reader(0)?;
		for (address, &word) in image.iter().enumerate() {
			let expected = word & org.data_mask();
			let found = reader.next().ok_or_else(|| format_err!("Unexpected end of EEPROM data"))??;
			if found != expected {
				return Err(EepromError::VerifyMismatch { address, expected, found }.into());
			}
		}

		Ok(())
	}

	/// Counts address bits until the chip answers a READ with its dummy 0.
	///
	/// Doesn't change the organization the handle is using.
	pub fn detect_organization(&mut self) -> crate::AResult<Organization> {
		let mut tx = self.bus.select()?;
		// start bit + READ opcode
		tx.send_frame(&Frame::new().push(0b1_10, 3))?;

		let mut address_bits = 0usize;
		loop {
			tx.send_bit(false)?;
			address_bits += 1;
			if !tx.data_out()? {
				break;
			}
			ensure!(address_bits < 16, "only detecting address width up to 16 bits allowed to prevent endless loop");
		}
		tx.finish()?;

		debug!("chip needs {} address bits", address_bits);
		Organization::from_address_width(address_bits)
			.ok_or_else(|| EepromError::OrganizationUnknown { address_bits }.into())
	}
}

pub struct Reader<'a, H: Hardware + 'a> {
	transaction: Transaction<'a, H>,
	data_width: u8,
	remaining: usize,
}

impl<'a, H: Hardware> Iterator for Reader<'a, H> {
	type Item = crate::AResult<u16>;

	fn next(&mut self) -> Option<Self::Item> {
		if 0 == self.remaining {
			return None;
		}
		self.remaining -= 1;
		Some(self.transaction.receive_bits(self.data_width))
	}
}

pub struct ProgrammingEnabled<'a, H: Hardware + 'a> {
	eeprom: &'a mut Eeprom<H>,
	// false if erase/write was already enabled before
	disable: bool,
}

impl<'a, H: Hardware> ProgrammingEnabled<'a, H> {
	/// Like dropping, but reports failure to disable erase/write.
	pub fn finish(mut self) -> crate::AResult<()> {
		if self.disable {
			self.disable = false;
			self.eeprom.ew_disable()?;
		}
		Ok(())
	}
}

impl<'a, H: Hardware> Drop for ProgrammingEnabled<'a, H> {
	fn drop(&mut self) {
		if self.disable {
			if let Err(e) = self.eeprom.ew_disable() {
				error!("Couldn't disable Erase/Write mode: {}", e);
			}
		}
	}
}

impl<'a, H: Hardware> Deref for ProgrammingEnabled<'a, H> {
	type Target = Eeprom<H>;

	fn deref(&self) -> &Self::Target {
		&self.eeprom
	}
}

impl<'a, H: Hardware> DerefMut for ProgrammingEnabled<'a, H> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.eeprom
	}
}
