//! Command Parsing
//!
//! Lines are matched case-insensitively against ordered tables: maintenance
//! commands first, then the `ST` set, then the `AT` set. Within a table the
//! first matching entry wins, so longer spellings that share a prefix with a
//! shorter command (`CFC0` vs `CF`, `DPN` vs `D1`) are listed first or are
//! disambiguated by their match kind.

use crate::control::MaintenanceCommand;
use crate::error::CommandError;
use crate::filter::FilterRule;
use crate::protocol::Protocol;

/// A parsed interpreter command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Maintenance(MaintenanceCommand),
    /// `SIMU START` / `SIMU STOP`
    Simulation(bool),

    // ST set
    StVersion,
    ListFilters,
    ClearAllFilters,
    AddPassFilter(FilterRule),
    ClearPassFilters,
    AddBlockFilter(FilterRule),
    ClearBlockFilters,
    MonitorFiltered,

    // AT set
    DeviceDescription,
    ReadIdentifier,
    SetIdentifier(String),
    AllowLongMessages,
    AdaptiveTiming(u8),
    CanAutoFormat(bool),
    CanFlowControl(bool),
    CanFilter(u32),
    CanMask(u32),
    ResetReceiveFilter,
    SetReceiveFilter(FilterRule),
    CanStatus,
    CanSilentMode(bool),
    Defaults,
    ShowDlc(bool),
    DescribeProtocol,
    DescribeProtocolNumber,
    Echo(bool),
    Headers(bool),
    Version,
    Linefeed(bool),
    Memory(bool),
    MonitorAll,
    MonitorReceiver(u32),
    MonitorTransmitter(u32),
    Responses(bool),
    Spaces(bool),
    SetProtocol { protocol: Protocol, auto: bool },
    TryProtocol { protocol: Protocol, auto: bool },
    SetTimeout(u32),
    WarmStart,
    ResetAll,
}

impl Command {
    /// Whether the command starts the monitor engine
    pub fn starts_monitor(&self) -> bool {
        matches!(
            self,
            Command::MonitorFiltered
                | Command::MonitorAll
                | Command::MonitorReceiver(_)
                | Command::MonitorTransmitter(_)
        )
    }
}

/// How a table entry matches the text after the command prefix
#[derive(Debug, Clone, Copy)]
enum Match {
    /// Whole remainder equals the name
    Exact(&'static str),
    /// Name followed by one digit up to the given maximum; trailing text ignored
    Toggle(&'static str, u8),
    /// Remainder starts with the name; the rest is the argument
    Prefix(&'static str),
}

/// Text following a matched name
struct Args<'a> {
    /// Upper-cased remainder
    upper: &'a str,
    /// Remainder in the original case
    raw: &'a str,
    /// Digit selected by a toggle
    digit: u8,
}

type Build = fn(&Args<'_>) -> Result<Command, CommandError>;

struct Entry {
    pattern: Match,
    build: Build,
}

impl Match {
    /// Byte length consumed and toggle digit on a match
    fn consume(&self, upper: &str) -> Option<(usize, u8)> {
        match *self {
            Match::Exact(name) => (upper == name).then_some((name.len(), 0)),
            Match::Prefix(name) => upper.starts_with(name).then_some((name.len(), 0)),
            Match::Toggle(name, max) => {
                let digit = upper.strip_prefix(name)?.bytes().next()?;
                let value = digit.checked_sub(b'0').filter(|v| *v <= max)?;
                Some((name.len() + 1, value))
            }
        }
    }
}

static MAINTENANCE_COMMANDS: &[Entry] = &[
    Entry { pattern: Match::Exact("REBOOT"), build: |_| Ok(Command::Maintenance(MaintenanceCommand::Restart)) },
    Entry { pattern: Match::Exact("RESTART"), build: |_| Ok(Command::Maintenance(MaintenanceCommand::Restart)) },
    Entry { pattern: Match::Exact("PS"), build: |_| Ok(Command::Maintenance(MaintenanceCommand::ProcessList)) },
    Entry { pattern: Match::Exact("FREE"), build: |_| Ok(Command::Maintenance(MaintenanceCommand::MemoryInfo)) },
    Entry { pattern: Match::Prefix("ELOG"), build: build_log_level },
    Entry { pattern: Match::Prefix("SIMU"), build: build_simulation },
    Entry {
        pattern: Match::Prefix("WIFI"),
        build: |args| Ok(Command::Maintenance(MaintenanceCommand::Network(args.raw.trim().to_string()))),
    },
    Entry {
        pattern: Match::Prefix("OTA"),
        build: |args| {
            let url = args.raw.trim();
            let url = (!url.is_empty()).then(|| url.to_string());
            Ok(Command::Maintenance(MaintenanceCommand::FirmwareUpdate(url)))
        },
    },
];

static ST_COMMANDS: &[Entry] = &[
    Entry { pattern: Match::Exact("DI"), build: |_| Ok(Command::StVersion) },
    Entry { pattern: Match::Exact("F"), build: |_| Ok(Command::ListFilters) },
    Entry { pattern: Match::Exact("FAC"), build: |_| Ok(Command::ClearAllFilters) },
    Entry { pattern: Match::Exact("FCA"), build: |_| Ok(Command::ClearAllFilters) },
    Entry { pattern: Match::Prefix("FPA"), build: |args| Ok(Command::AddPassFilter(read_rule(args.upper)?)) },
    Entry { pattern: Match::Prefix("FAP"), build: |args| Ok(Command::AddPassFilter(read_rule(args.upper)?)) },
    Entry { pattern: Match::Exact("FPC"), build: |_| Ok(Command::ClearPassFilters) },
    Entry { pattern: Match::Exact("FCP"), build: |_| Ok(Command::ClearPassFilters) },
    Entry { pattern: Match::Prefix("FBA"), build: |args| Ok(Command::AddBlockFilter(read_rule(args.upper)?)) },
    Entry { pattern: Match::Prefix("FAB"), build: |args| Ok(Command::AddBlockFilter(read_rule(args.upper)?)) },
    Entry { pattern: Match::Exact("FBC"), build: |_| Ok(Command::ClearBlockFilters) },
    Entry { pattern: Match::Exact("FCB"), build: |_| Ok(Command::ClearBlockFilters) },
    Entry { pattern: Match::Exact("M"), build: |_| Ok(Command::MonitorFiltered) },
    Entry { pattern: Match::Exact("MA"), build: |_| Ok(Command::MonitorFiltered) },
];

static AT_COMMANDS: &[Entry] = &[
    Entry { pattern: Match::Exact("@1"), build: |_| Ok(Command::DeviceDescription) },
    Entry { pattern: Match::Exact("@2"), build: |_| Ok(Command::ReadIdentifier) },
    Entry {
        pattern: Match::Prefix("@3"),
        build: |args| Ok(Command::SetIdentifier(args.raw.trim_start_matches(' ').to_string())),
    },
    Entry { pattern: Match::Exact("AL"), build: |_| Ok(Command::AllowLongMessages) },
    Entry { pattern: Match::Toggle("AT", 2), build: |args| Ok(Command::AdaptiveTiming(args.digit)) },
    Entry { pattern: Match::Toggle("CAF", 1), build: |args| Ok(Command::CanAutoFormat(args.digit != 0)) },
    Entry { pattern: Match::Toggle("CFC", 1), build: |args| Ok(Command::CanFlowControl(args.digit != 0)) },
    Entry { pattern: Match::Prefix("CF"), build: |args| Ok(Command::CanFilter(read_hex(args.upper).0)) },
    Entry { pattern: Match::Prefix("CM"), build: |args| Ok(Command::CanMask(read_hex(args.upper).0)) },
    Entry { pattern: Match::Exact("CRA"), build: |_| Ok(Command::ResetReceiveFilter) },
    Entry { pattern: Match::Prefix("CRA"), build: |args| Ok(Command::SetReceiveFilter(read_receive_filter(args.upper))) },
    Entry { pattern: Match::Exact("CS"), build: |_| Ok(Command::CanStatus) },
    Entry { pattern: Match::Toggle("CSM", 1), build: |args| Ok(Command::CanSilentMode(args.digit != 0)) },
    Entry { pattern: Match::Exact("D"), build: |_| Ok(Command::Defaults) },
    Entry { pattern: Match::Toggle("D", 1), build: |args| Ok(Command::ShowDlc(args.digit != 0)) },
    Entry { pattern: Match::Exact("DP"), build: |_| Ok(Command::DescribeProtocol) },
    Entry { pattern: Match::Exact("DPN"), build: |_| Ok(Command::DescribeProtocolNumber) },
    Entry { pattern: Match::Toggle("E", 1), build: |args| Ok(Command::Echo(args.digit != 0)) },
    Entry { pattern: Match::Toggle("H", 1), build: |args| Ok(Command::Headers(args.digit != 0)) },
    Entry { pattern: Match::Exact("I"), build: |_| Ok(Command::Version) },
    Entry { pattern: Match::Toggle("L", 1), build: |args| Ok(Command::Linefeed(args.digit != 0)) },
    Entry { pattern: Match::Toggle("M", 1), build: |args| Ok(Command::Memory(args.digit != 0)) },
    Entry { pattern: Match::Exact("MA"), build: |_| Ok(Command::MonitorAll) },
    Entry { pattern: Match::Prefix("MR"), build: |args| Ok(Command::MonitorReceiver(read_hex(args.upper).0)) },
    Entry { pattern: Match::Prefix("MT"), build: |args| Ok(Command::MonitorTransmitter(read_hex(args.upper).0)) },
    Entry { pattern: Match::Toggle("R", 1), build: |args| Ok(Command::Responses(args.digit != 0)) },
    Entry { pattern: Match::Toggle("S", 1), build: |args| Ok(Command::Spaces(args.digit != 0)) },
    Entry {
        pattern: Match::Prefix("SP"),
        build: |args| {
            let (protocol, auto) = read_protocol(args.upper);
            Ok(Command::SetProtocol { protocol, auto })
        },
    },
    Entry { pattern: Match::Prefix("ST"), build: |args| Ok(Command::SetTimeout(read_hex(args.upper).0)) },
    Entry {
        pattern: Match::Prefix("TP"),
        build: |args| {
            let (protocol, auto) = read_protocol(args.upper);
            Ok(Command::TryProtocol { protocol, auto })
        },
    },
    Entry { pattern: Match::Exact("WS"), build: |_| Ok(Command::WarmStart) },
    Entry { pattern: Match::Exact("Z"), build: |_| Ok(Command::ResetAll) },
];

/// Parse a hexadecimal number after optional leading spaces.
///
/// Consumes digits up to the first non-hex character and returns the value
/// with the unconsumed remainder. No digits yields zero; overflow keeps the
/// low 32 bits.
pub fn read_hex(text: &str) -> (u32, &str) {
    let text = text.trim_start_matches(' ');
    let mut value = 0u32;
    let mut consumed = 0;
    for c in text.chars() {
        let Some(digit) = c.to_digit(16) else { break };
        value = (value << 4) | digit;
        consumed += 1;
    }
    (value, &text[consumed..])
}

/// `pattern,mask` argument of the ST filter commands
fn read_rule(text: &str) -> Result<FilterRule, CommandError> {
    let text = text.trim_start_matches(' ');
    if text.is_empty() {
        return Err(CommandError::MissingArgument("pattern,mask"));
    }
    let (pattern, rest) = read_hex(text);
    let rest = rest
        .trim_start_matches(' ')
        .strip_prefix(',')
        .ok_or(CommandError::MissingArgument("mask"))?;
    let (mask, _) = read_hex(rest);
    Ok(FilterRule::new(pattern, mask))
}

/// `ATCRA` address: hex digits set a nibble, `X` is a wildcard nibble
fn read_receive_filter(text: &str) -> FilterRule {
    let mut pattern = 0u32;
    let mut mask = u32::MAX;
    for c in text.chars() {
        if let Some(digit) = c.to_digit(16) {
            pattern = (pattern << 4) | digit;
            mask = (mask << 4) | 0xF;
        } else if c == 'X' {
            pattern <<= 4;
            mask <<= 4;
        }
    }
    FilterRule::new(pattern, mask)
}

/// `[A]p` selector of `ATSP`/`ATTP`. A selector that resolves to automatic
/// forces the auto flag.
fn read_protocol(text: &str) -> (Protocol, bool) {
    let text = text.trim_start_matches(' ');
    let (auto, text) = match text.strip_prefix('A') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let protocol = Protocol::from_selector(text.chars().next().unwrap_or('0'));
    (protocol, auto || protocol == Protocol::Auto)
}

fn build_log_level(args: &Args<'_>) -> Result<Command, CommandError> {
    let raw = args.raw.trim_start_matches(' ');
    let (level, target) = if raw.is_empty() {
        (3, None)
    } else {
        let (level, rest) = read_hex(raw);
        let target = rest.trim();
        (level, (!target.is_empty()).then(|| target.to_string()))
    };
    Ok(Command::Maintenance(MaintenanceCommand::LogLevel { level, target }))
}

fn build_simulation(args: &Args<'_>) -> Result<Command, CommandError> {
    let sub = args.upper.trim_start_matches(' ');
    if sub.starts_with("STA") {
        Ok(Command::Simulation(true))
    } else if sub.starts_with("STO") {
        Ok(Command::Simulation(false))
    } else {
        Err(CommandError::Unrecognized(format!("SIMU{}", args.raw)))
    }
}

fn lookup(table: &[Entry], upper: &str, raw: &str) -> Option<Result<Command, CommandError>> {
    table.iter().find_map(|entry| {
        let (consumed, digit) = entry.pattern.consume(upper)?;
        let args = Args {
            upper: &upper[consumed..],
            raw: &raw[consumed..],
            digit,
        };
        Some((entry.build)(&args))
    })
}

/// Parse one command line. Leading spaces are ignored.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let raw = line.trim_start_matches(' ');
    let upper = raw.to_ascii_uppercase();
    let unrecognized = || CommandError::Unrecognized(raw.to_string());

    if let Some(result) = lookup(MAINTENANCE_COMMANDS, &upper, raw) {
        return result;
    }
    if let Some(rest) = upper.strip_prefix("ST") {
        return lookup(ST_COMMANDS, rest, &raw[2..]).unwrap_or_else(|| Err(unrecognized()));
    }
    if let Some(rest) = upper.strip_prefix("AT") {
        return lookup(AT_COMMANDS, rest, &raw[2..]).unwrap_or_else(|| Err(unrecognized()));
    }
    Err(unrecognized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(line: &str) -> Command {
        parse_command(line).unwrap()
    }

    #[test]
    fn test_toggles() {
        assert_eq!(parse("ATE0"), Command::Echo(false));
        assert_eq!(parse("ate1"), Command::Echo(true));
        assert_eq!(parse("ATL0"), Command::Linefeed(false));
        assert_eq!(parse("ATH1"), Command::Headers(true));
        assert_eq!(parse("ATS0"), Command::Spaces(false));
        assert_eq!(parse("ATD1"), Command::ShowDlc(true));
        assert_eq!(parse("ATAT2"), Command::AdaptiveTiming(2));
        assert_eq!(parse("ATCAF1"), Command::CanAutoFormat(true));
        assert_eq!(parse("ATCSM0"), Command::CanSilentMode(false));
        assert_eq!(parse("ATM0"), Command::Memory(false));
        assert_eq!(parse("ATR1"), Command::Responses(true));
        // Trailing text after the digit is ignored
        assert_eq!(parse("ATE1XYZ"), Command::Echo(true));
        assert!(parse_command("ATE2").is_err());
        assert!(parse_command("ATAT3").is_err());
    }

    #[test]
    fn test_shared_prefixes() {
        assert_eq!(parse("ATCFC0"), Command::CanFlowControl(false));
        assert_eq!(parse("ATCF7E8"), Command::CanFilter(0x7E8));
        assert_eq!(parse("ATD"), Command::Defaults);
        assert_eq!(parse("ATDP"), Command::DescribeProtocol);
        assert_eq!(parse("ATDPN"), Command::DescribeProtocolNumber);
        assert_eq!(parse("ATCS"), Command::CanStatus);
        assert_eq!(parse("ATMA"), Command::MonitorAll);
        assert_eq!(parse("ATCRA"), Command::ResetReceiveFilter);
        assert_eq!(parse("ATST 32"), Command::SetTimeout(0x32));
        assert_eq!(parse("ATSP6"), Command::SetProtocol { protocol: Protocol::Iso15765_4Can11bit500, auto: false });
    }

    #[test]
    fn test_identifier_keeps_case() {
        assert_eq!(parse("at@3 My Garage"), Command::SetIdentifier("My Garage".to_string()));
        assert_eq!(parse("AT@2"), Command::ReadIdentifier);
        assert_eq!(parse("AT@1"), Command::DeviceDescription);
    }

    #[test]
    fn test_protocol_selector() {
        assert_eq!(parse("ATSPA6"), Command::SetProtocol { protocol: Protocol::Iso15765_4Can11bit500, auto: true });
        assert_eq!(parse("ATSP 0"), Command::SetProtocol { protocol: Protocol::Auto, auto: true });
        assert_eq!(parse("ATTP"), Command::TryProtocol { protocol: Protocol::Auto, auto: true });
        assert_eq!(parse("ATTPZ"), Command::TryProtocol { protocol: Protocol::Auto, auto: true });
        assert_eq!(parse("ATTP 9"), Command::TryProtocol { protocol: Protocol::Iso15765_4Can29bit250, auto: false });
    }

    #[test]
    fn test_receive_filter() {
        assert_eq!(parse("ATCRA 7E8"), Command::SetReceiveFilter(FilterRule::new(0x7E8, 0xFFFF_FFFF)));
        assert_eq!(parse("ATCRA7XX"), Command::SetReceiveFilter(FilterRule::new(0x700, 0xFFFF_FF00)));
        assert_eq!(parse("ATCRA 1x3"), Command::SetReceiveFilter(FilterRule::new(0x103, 0xFFFF_FF0F)));
    }

    #[test]
    fn test_monitor_commands() {
        assert_eq!(parse("ATMR 57"), Command::MonitorReceiver(0x57));
        assert_eq!(parse("ATMT0200"), Command::MonitorTransmitter(0x200));
        assert_eq!(parse("STM"), Command::MonitorFiltered);
        assert_eq!(parse("stma"), Command::MonitorFiltered);
        assert!(parse("ATMA").starts_monitor());
        assert!(!parse("ATI").starts_monitor());
    }

    #[test]
    fn test_st_filters() {
        assert_eq!(parse("STFPA 257,7FF"), Command::AddPassFilter(FilterRule::new(0x257, 0x7FF)));
        assert_eq!(parse("STFAB 3E9 , 7FF"), Command::AddBlockFilter(FilterRule::new(0x3E9, 0x7FF)));
        assert_eq!(parse("STFAC"), Command::ClearAllFilters);
        assert_eq!(parse("STFCP"), Command::ClearPassFilters);
        assert_eq!(parse("STFBC"), Command::ClearBlockFilters);
        assert_eq!(parse("STF"), Command::ListFilters);
        assert_eq!(parse("STDI"), Command::StVersion);

        assert_eq!(parse_command("STFPA"), Err(CommandError::MissingArgument("pattern,mask")));
        assert_eq!(parse_command("STFBA 257"), Err(CommandError::MissingArgument("mask")));
    }

    #[test]
    fn test_maintenance() {
        assert_eq!(parse("reboot"), Command::Maintenance(MaintenanceCommand::Restart));
        assert_eq!(parse("PS"), Command::Maintenance(MaintenanceCommand::ProcessList));
        assert_eq!(parse("FREE"), Command::Maintenance(MaintenanceCommand::MemoryInfo));
        assert_eq!(
            parse("ELOG 4 can_bus"),
            Command::Maintenance(MaintenanceCommand::LogLevel { level: 4, target: Some("can_bus".to_string()) })
        );
        assert_eq!(
            parse("ELOG"),
            Command::Maintenance(MaintenanceCommand::LogLevel { level: 3, target: None })
        );
        assert_eq!(parse("SIMU START"), Command::Simulation(true));
        assert_eq!(parse("simu stop"), Command::Simulation(false));
        assert!(matches!(parse_command("SIMU FAST"), Err(CommandError::Unrecognized(_))));
        assert_eq!(parse("OTA"), Command::Maintenance(MaintenanceCommand::FirmwareUpdate(None)));
        assert_eq!(
            parse("WIFI STA home secret"),
            Command::Maintenance(MaintenanceCommand::Network("STA home secret".to_string()))
        );
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(parse_command("HELLO"), Err(CommandError::Unrecognized("HELLO".to_string())));
        assert!(parse_command("ATXYZ").is_err());
        assert!(parse_command("STXYZ").is_err());
        assert!(parse_command("").is_err());
        // Spaces inside the command are not skipped
        assert!(parse_command("AT E0").is_err());
        assert_eq!(parse("   ATI"), Command::Version);
    }

    #[test]
    fn test_read_hex() {
        assert_eq!(read_hex("  1aF,rest"), (0x1AF, ",rest"));
        assert_eq!(read_hex("zz"), (0, "zz"));
        assert_eq!(read_hex(""), (0, ""));
        assert_eq!(read_hex("123456789"), (0x2345_6789, ""));
    }

    proptest! {
        #[test]
        fn prop_read_hex_matches_formatting(value: u32, suffix in "[g-z,]{0,4}") {
            let text = format!("{:X}{}", value, suffix);
            prop_assert_eq!(read_hex(&text), (value, suffix.as_str()));
        }

        #[test]
        fn prop_parse_never_panics(line in "[ -~]{0,40}") {
            let _ = parse_command(&line);
        }
    }
}
