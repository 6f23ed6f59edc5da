//! OBD-II Protocol Selector

use serde::{Deserialize, Serialize};

/// Protocols selectable with `ATSP`/`ATTP`, numbered as in the ELM327 datasheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (5 baud init, 10.4 kbaud)
    Iso9141_2,
    /// ISO 14230-4 KWP (5 baud init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
    /// SAE J1939 (29 bit ID, 250 kbaud)
    J1939,
    User1Can,
    User2Can,
}

impl Protocol {
    const ALL: [Protocol; 13] = [
        Protocol::Auto,
        Protocol::J1850Pwm,
        Protocol::J1850Vpw,
        Protocol::Iso9141_2,
        Protocol::Iso14230_4Kwp,
        Protocol::Iso14230_4KwpFast,
        Protocol::Iso15765_4Can11bit500,
        Protocol::Iso15765_4Can29bit500,
        Protocol::Iso15765_4Can11bit250,
        Protocol::Iso15765_4Can29bit250,
        Protocol::J1939,
        Protocol::User1Can,
        Protocol::User2Can,
    ];

    /// Look up a selector digit (`0`-`9`, `A`-`C`). Unknown selectors fall
    /// back to automatic.
    pub fn from_selector(selector: char) -> Self {
        let selector = selector.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|p| p.selector() == selector)
            .unwrap_or(Protocol::Auto)
    }

    /// Datasheet selector digit
    pub fn selector(&self) -> char {
        match self {
            Protocol::Auto => '0',
            Protocol::J1850Pwm => '1',
            Protocol::J1850Vpw => '2',
            Protocol::Iso9141_2 => '3',
            Protocol::Iso14230_4Kwp => '4',
            Protocol::Iso14230_4KwpFast => '5',
            Protocol::Iso15765_4Can11bit500 => '6',
            Protocol::Iso15765_4Can29bit500 => '7',
            Protocol::Iso15765_4Can11bit250 => '8',
            Protocol::Iso15765_4Can29bit250 => '9',
            Protocol::J1939 => 'A',
            Protocol::User1Can => 'B',
            Protocol::User2Can => 'C',
        }
    }

    /// Text printed by `ATDP`
    pub fn description(&self) -> &'static str {
        match self {
            Protocol::Auto => "Automatic",
            Protocol::J1850Pwm => "SAE J1850 PWM",
            Protocol::J1850Vpw => "SAE J1850 VPW",
            Protocol::Iso9141_2 => "ISO 9141-2",
            Protocol::Iso14230_4Kwp => "ISO 14230-4 (KWP 5BAUD)",
            Protocol::Iso14230_4KwpFast => "ISO 14230-4 (KWP FAST)",
            Protocol::Iso15765_4Can11bit500 => "ISO 15765-4 (CAN 11/500)",
            Protocol::Iso15765_4Can29bit500 => "ISO 15765-4 (CAN 29/500)",
            Protocol::Iso15765_4Can11bit250 => "ISO 15765-4 (CAN 11/250)",
            Protocol::Iso15765_4Can29bit250 => "ISO 15765-4 (CAN 29/250)",
            Protocol::J1939 => "SAE J1939 (CAN 29/250)",
            Protocol::User1Can => "USER1 CAN",
            Protocol::User2Can => "USER2 CAN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_lookup() {
        assert_eq!(Protocol::from_selector('6'), Protocol::Iso15765_4Can11bit500);
        assert_eq!(Protocol::from_selector('a'), Protocol::J1939);
        assert_eq!(Protocol::from_selector('Z'), Protocol::Auto);
        for p in Protocol::ALL {
            assert_eq!(Protocol::from_selector(p.selector()), p);
        }
    }

}
