mod sysfs;

// OS-specific. for now linux only.
pub use self::sysfs::{
	SYSFS_GPIO_ROOT,
	SysfsGpio,
};
