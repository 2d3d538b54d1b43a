use std::collections::HashMap;
use std::fs;
use std::io::{
	self,
	Write,
};
use std::os::unix::fs::{
	FileExt,
	OpenOptionsExt,
};
use std::path::PathBuf;

use libc::{
	O_CLOEXEC,
	O_SYNC,
};

use crate::serial::{
	Direction,
	Hardware,
	Pin,
};

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

struct Line {
	value: fs::File,
	// unexport on drop
	exported: bool,
}

/// GPIOs through the (deprecated, but everywhere available) sysfs interface.
pub struct SysfsGpio {
	root: PathBuf,
	lines: HashMap<Pin, Line>,
}

impl SysfsGpio {
	pub fn new() -> Self {
		Self::with_root(SYSFS_GPIO_ROOT)
	}

	pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
		SysfsGpio {
			root: root.into(),
			lines: HashMap::new(),
		}
	}

	fn gpio_dir(&self, pin: Pin) -> PathBuf {
		self.root.join(format!("gpio{}", pin))
	}

	// need to write in one syscall for export/unexport
	fn write_control(&self, name: &str, pin: Pin) -> crate::AResult<()> {
		let path = self.root.join(name);
		with_context!(("{} GPIO {} ({})", name, pin, path.display()), {
			fs::OpenOptions::new().write(true).open(&path)?.write_all(pin.to_string().as_bytes())?;
			Ok(())
		})
	}

	fn line(&mut self, pin: Pin) -> crate::AResult<&mut Line> {
		match self.lines.get_mut(&pin) {
			Some(line) => Ok(line),
			None => bail!("GPIO {} used before it was configured", pin),
		}
	}
}

impl Default for SysfsGpio {
	fn default() -> Self {
		Self::new()
	}
}

impl Hardware for SysfsGpio {
	fn configure(&mut self, pin: Pin, direction: Direction) -> crate::AResult<()> {
		let dir = self.gpio_dir(pin);
		let exported = if dir.exists() {
			false
		} else {
			debug!("exporting GPIO {}", pin);
			self.write_control("export", pin)?;
			true
		};

		let direction_name: &[u8] = match direction {
			Direction::Input => b"in",
			Direction::Output => b"out",
		};
		let value = with_context!(("configure GPIO {} as {:?}", pin, direction), {
			fs::OpenOptions::new().write(true).open(dir.join("direction"))?.write_all(direction_name)?;
			let value = fs::OpenOptions::new()
				.read(true)
				.write(Direction::Output == direction)
				.custom_flags(O_CLOEXEC | O_SYNC)
				.open(dir.join("value"))?;
			Ok(value)
		});
		let value = match value {
			Ok(value) => value,
			Err(e) => {
				// not tracked in `lines` yet, so drop wouldn't unexport it
				if exported {
					if let Err(e) = self.write_control("unexport", pin) {
						warn!("Failed to unexport GPIO {}: {}", pin, e);
					}
				}
				return Err(e);
			},
		};

		// keep a previous "exported" flag if configured twice
		let exported = exported || self.lines.get(&pin).map(|l| l.exported).unwrap_or(false);
		self.lines.insert(pin, Line { value, exported });
		Ok(())
	}

	fn write_pin(&mut self, pin: Pin, high: bool) -> crate::AResult<()> {
		let data: &[u8] = if high { b"1" } else { b"0" };
		let line = self.line(pin)?;
		let l = line.value.write_at(data, 0)?;
		ensure!(l == data.len(), "failed to write GPIO {} value", pin);
		Ok(())
	}

	fn read_pin(&mut self, pin: Pin) -> crate::AResult<bool> {
		let line = self.line(pin)?;
		let mut buf = [0u8; 1];
		let l = line.value.read_at(&mut buf, 0)?;
		if l != buf.len() {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, format!("empty value for GPIO {}", pin)).into());
		}
		Ok(b'1' == buf[0])
	}
}

impl Drop for SysfsGpio {
	fn drop(&mut self) {
		let pins: Vec<Pin> = self.lines.drain()
			.filter(|(_, line)| line.exported)
			.map(|(pin, _)| pin)
			.collect();
		for pin in pins {
			if let Err(e) = self.write_control("unexport", pin) {
				warn!("Failed to unexport GPIO {}: {}", pin, e);
			}
		}
	}
}

#[cfg(test)]
mod test {
	use std::fs;
	use std::path::PathBuf;

	use super::SysfsGpio;
	use crate::serial::{
		Direction,
		Hardware,
	};

	// fake sysfs tree with already exported GPIOs
	fn fake_root(name: &str, pins: &[u32]) -> PathBuf {
		let root = std::env::temp_dir().join(format!("eeprom-93c46-{}-{}", name, std::process::id()));
		let _ = fs::remove_dir_all(&root);
		for pin in pins {
			let dir = root.join(format!("gpio{}", pin));
			fs::create_dir_all(&dir).unwrap();
			fs::write(dir.join("direction"), "in").unwrap();
			fs::write(dir.join("value"), "0").unwrap();
		}
		root
	}

	#[test]
	fn configure_write_read() {
		let root = fake_root("rw", &[4, 22]);
		{
			let mut gpio = SysfsGpio::with_root(&root);
			gpio.configure(4, Direction::Output).unwrap();
			gpio.configure(22, Direction::Input).unwrap();
			assert_eq!("out", fs::read_to_string(root.join("gpio4/direction")).unwrap());
			assert_eq!("in", fs::read_to_string(root.join("gpio22/direction")).unwrap());

			gpio.write_pin(4, true).unwrap();
			assert_eq!("1", fs::read_to_string(root.join("gpio4/value")).unwrap());
			gpio.write_pin(4, false).unwrap();
			assert_eq!("0", fs::read_to_string(root.join("gpio4/value")).unwrap());

			assert!(!gpio.read_pin(22).unwrap());
			fs::write(root.join("gpio22/value"), "1\n").unwrap();
			assert!(gpio.read_pin(22).unwrap());
		}
		// nothing was exported by us, so nothing to unexport
		assert!(!root.join("unexport").exists());
		fs::remove_dir_all(&root).unwrap();
	}

	#[test]
	fn failed_configure_unexports() {
		// export "works", but the kernel never creates gpio7/
		let root = fake_root("failed-configure", &[]);
		fs::create_dir_all(&root).unwrap();
		fs::write(root.join("export"), "").unwrap();
		fs::write(root.join("unexport"), "").unwrap();
		{
			let mut gpio = SysfsGpio::with_root(&root);
			assert!(gpio.configure(7, Direction::Output).is_err());
			assert_eq!("7", fs::read_to_string(root.join("export")).unwrap());
			assert_eq!("7", fs::read_to_string(root.join("unexport")).unwrap());
			fs::write(root.join("unexport"), "").unwrap();
		}
		// nothing left to unexport on drop
		assert_eq!("", fs::read_to_string(root.join("unexport")).unwrap());
		fs::remove_dir_all(&root).unwrap();
	}

	#[test]
	fn unconfigured_pin() {
		let root = fake_root("unconfigured", &[]);
		let mut gpio = SysfsGpio::with_root(&root);
		assert!(gpio.write_pin(5, true).is_err());
		assert!(gpio.read_pin(5).is_err());
		// no export control file in the fake tree
		assert!(gpio.configure(5, Direction::Output).is_err());
	}
}
