//! Pin level model of a 93C46, used to test the protocol engine without
//! hardware.

use crate::serial::{
	Direction,
	Hardware,
	Organization,
	Pin,
	Pins,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
	Configure(Pin, Direction),
	Write(Pin, bool),
	Read(Pin, bool),
	Delay(u32),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Pending {
	Write { address: usize, data: u16 },
	WriteAll(u16),
	Erase { address: usize },
	EraseAll,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	// waiting for the start bit
	Standby,
	Instruction { bits: u8, shift: u16 },
	Data { address: Option<usize>, bits: u8, shift: u16 },
	ReadOut { address: usize, bits_left: u8 },
	// instruction complete, waiting for CS to drop
	Done,
}

pub struct SimulatedChip {
	pins: Pins,
	organization: Organization,
	memory: Vec<u16>,
	write_enabled: bool,
	absent: bool,
	fail_writes: bool,
	// number of DO polls a programming cycle stays busy; None: forever
	busy_polls: Option<usize>,
	busy: Option<Option<usize>>,

	chip_select: bool,
	clock: bool,
	data_in: bool,
	data_out: bool,
	state: State,
	pending: Option<Pending>,

	events: Vec<Event>,
	frames: Vec<String>,
	polls: usize,
	delayed_us: u64,
}

impl SimulatedChip {
	/// Erased chip (all bits "1") with write/erase disabled.
	pub fn new(pins: Pins, organization: Organization) -> Self {
		SimulatedChip {
			pins,
			organization,
			memory: vec![organization.data_mask(); organization.cells()],
			write_enabled: false,
			absent: false,
			fail_writes: false,
			busy_polls: Some(3),
			busy: None,
			chip_select: false,
			clock: false,
			data_in: false,
			data_out: true,
			state: State::Standby,
			pending: None,
			events: Vec::new(),
			frames: Vec::new(),
			polls: 0,
			delayed_us: 0,
		}
	}

	/// Nothing connected: DO is pulled up and never driven.
	pub fn absent(pins: Pins, organization: Organization) -> Self {
		let mut chip = Self::new(pins, organization);
		chip.absent = true;
		chip
	}

	pub fn set_busy_polls(&mut self, polls: usize) {
		self.busy_polls = Some(polls);
	}

	/// Programming cycles never finish.
	pub fn set_never_ready(&mut self) {
		self.busy_polls = None;
	}

	/// Accept write/erase instructions (including BUSY), but keep the memory.
	pub fn set_fail_writes(&mut self, fail: bool) {
		self.fail_writes = fail;
	}

	pub fn organization(&self) -> Organization {
		self.organization
	}

	pub fn memory(&self) -> &[u16] {
		&self.memory
	}

	pub fn set_memory(&mut self, data: &[u16]) {
		let mask = self.organization.data_mask();
		for (cell, &value) in self.memory.iter_mut().zip(data) {
			*cell = value & mask;
		}
	}

	pub fn cell(&self, address: usize) -> u16 {
		self.memory[address]
	}

	pub fn set_cell(&mut self, address: usize, value: u16) {
		self.memory[address] = value & self.organization.data_mask();
	}

	/// The latch inside the chip, not the driver's shadow of it.
	pub fn is_write_enabled(&self) -> bool {
		self.write_enabled
	}

	pub fn events(&self) -> &[Event] {
		&self.events
	}

	/// Levels written to `pin`, in order.
	pub fn writes_to(&self, pin: Pin) -> Vec<bool> {
		self.events.iter().filter_map(|e| match *e {
			Event::Write(p, level) if p == pin => Some(level),
			_ => None,
		}).collect()
	}

	/// DI sampled at each rising clock edge, one string per CS high period.
	pub fn frames(&self) -> &[String] {
		&self.frames
	}

	/// How often DO was sampled.
	pub fn polls(&self) -> usize {
		self.polls
	}

	/// Sum of all delays requested through `delay_us`.
	pub fn delayed_us(&self) -> u64 {
		self.delayed_us
	}

	pub fn clear_log(&mut self) {
		self.events.clear();
		self.frames.clear();
		self.polls = 0;
		self.delayed_us = 0;
	}

	fn chip_select_changed(&mut self, active: bool) {
		if active {
			self.frames.push(String::new());
		} else if let Some(pending) = self.pending.take() {
			self.execute(pending);
		}
		self.state = State::Standby;
		self.data_out = true;
	}

	fn execute(&mut self, pending: Pending) {
		if !self.write_enabled {
			trace!("sim: ignoring {:?}, erase/write disabled", pending);
			return;
		}
		trace!("sim: {:?}", pending);
		if !self.fail_writes {
			let erased = self.organization.data_mask();
			match pending {
				Pending::Write { address, data } => self.memory[address] = data,
				Pending::WriteAll(data) => for cell in self.memory.iter_mut() { *cell = data },
				Pending::Erase { address } => self.memory[address] = erased,
				Pending::EraseAll => for cell in self.memory.iter_mut() { *cell = erased },
			}
		}
		self.busy = Some(self.busy_polls);
	}

	fn decode(&mut self, shift: u16) {
		let address_width = self.organization.address_width();
		let address = (shift as usize) & (self.organization.cells() - 1);
		self.state = match shift >> address_width {
			0b10 => {
				// dummy bit
				self.data_out = false;
				State::ReadOut { address, bits_left: self.organization.data_width() }
			},
			0b01 => State::Data { address: Some(address), bits: 0, shift: 0 },
			0b11 => {
				self.pending = Some(Pending::Erase { address });
				State::Done
			},
			_ => match address >> (address_width - 2) {
				0b00 => {
					self.write_enabled = false;
					State::Done
				},
				0b01 => State::Data { address: None, bits: 0, shift: 0 },
				0b10 => {
					self.pending = Some(Pending::EraseAll);
					State::Done
				},
				_ => {
					self.write_enabled = true;
					State::Done
				},
			},
		};
	}

	fn rising_clock(&mut self) {
		let bit = self.data_in;
		if let Some(frame) = self.frames.last_mut() {
			frame.push(if bit { '1' } else { '0' });
		}

		let instruction_width = 2 + self.organization.address_width();
		let data_width = self.organization.data_width();
		match self.state {
			State::Standby => {
				// leading zeros are ignored
				if bit {
					self.state = State::Instruction { bits: 0, shift: 0 };
				}
			},
			State::Instruction { bits, shift } => {
				let bits = bits + 1;
				let shift = (shift << 1) | (bit as u16);
				if bits == instruction_width {
					self.decode(shift);
				} else {
					self.state = State::Instruction { bits, shift };
				}
			},
			State::Data { address, bits, shift } => {
				let bits = bits + 1;
				let shift = (shift << 1) | (bit as u16);
				if bits == data_width {
					self.pending = Some(match address {
						Some(address) => Pending::Write { address, data: shift },
						None => Pending::WriteAll(shift),
					});
					self.state = State::Done;
				} else {
					self.state = State::Data { address, bits, shift };
				}
			},
			State::ReadOut { address, bits_left } => {
				// sequential read continues with the next cell
				let (address, bits_left) = if 0 == bits_left {
					((address + 1) % self.organization.cells(), data_width)
				} else {
					(address, bits_left)
				};
				let bits_left = bits_left - 1;
				self.data_out = 0 != self.memory[address] & (1u16 << bits_left);
				self.state = State::ReadOut { address, bits_left };
			},
			State::Done => (),
		}
	}

	fn sample_data_out(&mut self) -> bool {
		self.polls += 1;
		if self.absent || !self.chip_select {
			return true;
		}
		match self.state {
			State::ReadOut { .. } => self.data_out,
			State::Standby => match self.busy {
				None => true,
				Some(None) => false,
				Some(Some(0)) => {
					self.busy = None;
					true
				},
				Some(Some(n)) => {
					self.busy = Some(Some(n - 1));
					false
				},
			},
			_ => true,
		}
	}
}

impl Hardware for SimulatedChip {
	fn configure(&mut self, pin: Pin, direction: Direction) -> crate::AResult<()> {
		let expected = if pin == self.pins.data_out {
			Direction::Input
		} else if pin == self.pins.chip_select || pin == self.pins.clock || pin == self.pins.data_in {
			Direction::Output
		} else {
			bail!("pin {} not connected to simulated chip", pin);
		};
		ensure!(expected == direction, "pin {} must be configured as {:?}", pin, expected);
		self.events.push(Event::Configure(pin, direction));
		Ok(())
	}

	fn write_pin(&mut self, pin: Pin, high: bool) -> crate::AResult<()> {
		self.events.push(Event::Write(pin, high));
		if pin == self.pins.chip_select {
			if high != self.chip_select {
				self.chip_select = high;
				self.chip_select_changed(high);
			}
		} else if pin == self.pins.clock {
			let rising = high && !self.clock;
			self.clock = high;
			if rising && self.chip_select && !self.absent {
				self.rising_clock();
			}
		} else if pin == self.pins.data_in {
			self.data_in = high;
		} else {
			bail!("can't drive pin {} on simulated chip", pin);
		}
		Ok(())
	}

	fn read_pin(&mut self, pin: Pin) -> crate::AResult<bool> {
		let level = if pin == self.pins.data_out {
			self.sample_data_out()
		} else if pin == self.pins.chip_select {
			self.chip_select
		} else if pin == self.pins.clock {
			self.clock
		} else if pin == self.pins.data_in {
			self.data_in
		} else {
			bail!("pin {} not connected to simulated chip", pin);
		};
		self.events.push(Event::Read(pin, level));
		Ok(level)
	}

	fn delay_us(&mut self, us: u32) {
		self.events.push(Event::Delay(us));
		self.delayed_us += us as u64;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	const PINS: Pins = Pins {
		chip_select: 10,
		clock: 11,
		data_in: 12,
		data_out: 13,
	};

	fn clock_in(chip: &mut SimulatedChip, bits: &str) {
		for c in bits.chars() {
			chip.write_pin(PINS.data_in, c == '1').unwrap();
			chip.write_pin(PINS.clock, true).unwrap();
			chip.write_pin(PINS.clock, false).unwrap();
		}
	}

	#[test]
	fn leading_zeros_before_start_bit() {
		let mut chip = SimulatedChip::new(PINS, Organization::Word16);
		chip.write_pin(PINS.chip_select, true).unwrap();
		clock_in(&mut chip, "000100110000");
		chip.write_pin(PINS.chip_select, false).unwrap();
		assert!(chip.is_write_enabled());
		assert_eq!(&["000100110000".to_string()], chip.frames());
	}

	#[test]
	fn write_needs_latch() {
		let mut chip = SimulatedChip::new(PINS, Organization::Byte8);
		chip.write_pin(PINS.chip_select, true).unwrap();
		clock_in(&mut chip, "1010000001");
		clock_in(&mut chip, "01010101");
		chip.write_pin(PINS.chip_select, false).unwrap();
		assert_eq!(0xff, chip.cell(1));

		// DO stays high: no programming cycle started
		chip.write_pin(PINS.chip_select, true).unwrap();
		assert!(chip.read_pin(PINS.data_out).unwrap());
	}

	#[test]
	fn busy_after_programming() {
		let mut chip = SimulatedChip::new(PINS, Organization::Word16);
		chip.set_busy_polls(2);
		chip.write_pin(PINS.chip_select, true).unwrap();
		clock_in(&mut chip, "100110000");
		chip.write_pin(PINS.chip_select, false).unwrap();
		chip.write_pin(PINS.chip_select, true).unwrap();
		clock_in(&mut chip, "111000011");
		chip.write_pin(PINS.chip_select, false).unwrap();
		assert_eq!(0xffff, chip.cell(3));

		chip.write_pin(PINS.chip_select, true).unwrap();
		let levels: Vec<bool> = (0..4).map(|_| chip.read_pin(PINS.data_out).unwrap()).collect();
		assert_eq!(vec![false, false, true, true], levels);
	}

	#[test]
	fn unknown_pins() {
		let mut chip = SimulatedChip::new(PINS, Organization::Word16);
		assert!(chip.configure(99, Direction::Output).is_err());
		assert!(chip.configure(PINS.data_out, Direction::Output).is_err());
		assert!(chip.write_pin(PINS.data_out, true).is_err());
		assert!(chip.read_pin(99).is_err());
	}
}
