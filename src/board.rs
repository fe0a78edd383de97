use serde::{Deserialize, Serialize};

/// Number of logical pins addressable through this layer.
pub const GPIO_PINS: usize = 32;

/// Kernel pin number as used by the sysfs `export` interface.
pub type PhysicalPin = u32;

// Pins 12, 13, 16, 19-21 and 26 are wired to the SD card slot and only free
// when the board boots from eMMC.
const SD_CARD_TABLE: [Option<PhysicalPin>; GPIO_PINS] = [
    None,
    None,
    Some(89),
    Some(88),
    Some(60),
    Some(70),
    Some(2),
    Some(76),
    Some(104),
    Some(98),
    Some(67),
    Some(96),
    None,
    None,
    Some(64),
    Some(65),
    None,
    Some(66),
    Some(67),
    None,
    None,
    None,
    Some(100),
    Some(101),
    Some(102),
    Some(103),
    None,
    Some(0),
    None,
    None,
    None,
    None,
];

const EMMC_TABLE: [Option<PhysicalPin>; GPIO_PINS] = [
    None,
    None,
    Some(89),
    Some(88),
    Some(60),
    Some(70),
    Some(2),
    Some(76),
    Some(104),
    Some(98),
    Some(67),
    Some(96),
    Some(38),
    Some(32),
    Some(64),
    Some(65),
    Some(37),
    Some(66),
    Some(67),
    Some(33),
    Some(36),
    Some(35),
    Some(100),
    Some(101),
    Some(102),
    Some(103),
    Some(34),
    Some(0),
    None,
    None,
    None,
    None,
];

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BootMedia {
    SdCard,
    Emmc,
}

impl Default for BootMedia {
    fn default() -> Self {
        if cfg!(feature = "emmc-boot") {
            BootMedia::Emmc
        } else {
            BootMedia::SdCard
        }
    }
}

/// Logical to physical pin translation for the Rock64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    table: &'static [Option<PhysicalPin>; GPIO_PINS],
}

impl PinMap {
    pub const SD_CARD: PinMap = PinMap {
        table: &SD_CARD_TABLE,
    };
    pub const EMMC: PinMap = PinMap { table: &EMMC_TABLE };

    pub fn for_boot_media(media: BootMedia) -> Self {
        match media {
            BootMedia::SdCard => Self::SD_CARD,
            BootMedia::Emmc => Self::EMMC,
        }
    }

    /// Returns `None` for indices outside `[0, GPIO_PINS)` and for pins not
    /// routed on this board.
    pub fn physical_pin(&self, logical: usize) -> Option<PhysicalPin> {
        self.table.get(logical).copied().flatten()
    }

    pub fn available_pins(&self) -> impl Iterator<Item = (usize, PhysicalPin)> + '_ {
        self.table
            .iter()
            .enumerate()
            .filter_map(|(logical, physical)| physical.map(|p| (logical, p)))
    }
}

impl Default for PinMap {
    fn default() -> Self {
        Self::for_boot_media(BootMedia::default())
    }
}
