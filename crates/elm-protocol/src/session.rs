//! Protocol Session
//!
//! One REPL per connected transport. Bytes are echoed and collected into a
//! line until carriage return, then the line is parsed and executed against
//! the session's own [`SessionState`]. Monitor commands hand the writer to a
//! monitor task; the next received byte stops it and is then interpreted
//! normally.

use crate::command::{parse_command, Command};
use crate::control::{ControlReply, SystemControl};
use crate::error::{CommandError, SessionError, TransportError};
use crate::filter::FilterRule;
use crate::monitor::{spawn_monitor, MonitorExit, MonitorHandle, MonitorSettings};
use crate::state::SessionState;
use crate::transport::{write_all, Transport, TransportReader, TransportWriter};
use crate::{ident, token};
use can_bus::{Simulator, SubscriptionRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest command line in input bytes; extra bytes are dropped
const LINE_CAPACITY: usize = 127;
const READ_CHUNK: usize = 64;

const EOT: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;
const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Services shared by every session
pub struct SessionContext {
    pub registry: SubscriptionRegistry,
    pub simulator: Simulator,
    pub control: Arc<dyn SystemControl>,
    pub monitor: MonitorSettings,
}

impl SessionContext {
    pub fn new(
        registry: SubscriptionRegistry,
        simulator: Simulator,
        control: Arc<dyn SystemControl>,
    ) -> Self {
        Self {
            registry,
            simulator,
            control,
            monitor: MonitorSettings::default(),
        }
    }

    pub fn with_monitor_settings(mut self, monitor: MonitorSettings) -> Self {
        self.monitor = monitor;
        self
    }
}

/// What a command produced, before it is written out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing besides the prompt
    Silent,
    Ok,
    Error,
    /// `?`
    Unknown,
    Line(String),
    Lines(Vec<String>),
    /// Hand the output stream to the monitor engine
    StartMonitor,
}

impl From<CommandError> for Reply {
    fn from(err: CommandError) -> Self {
        match err.token() {
            token::ERROR => Reply::Error,
            _ => Reply::Unknown,
        }
    }
}

impl From<ControlReply> for Reply {
    fn from(reply: ControlReply) -> Self {
        match reply {
            ControlReply::Silent => Reply::Silent,
            ControlReply::Ok => Reply::Ok,
            ControlReply::Error => Reply::Error,
            ControlReply::Lines(lines) => Reply::Lines(lines),
        }
    }
}

/// Resolve repeat-on-empty, parse and execute one submitted line
pub(crate) fn interpret(state: &mut SessionState, ctx: &SessionContext, line: &str) -> Reply {
    let line = if line.is_empty() {
        state.previous_command.clone()
    } else {
        state.previous_command = line.to_string();
        line.to_string()
    };
    debug!("Do cmd: '{}'", line);
    metrics::counter!("elm_commands_total").increment(1);

    match parse_command(&line).and_then(|command| execute(state, ctx, command)) {
        Ok(reply) => reply,
        Err(e) => {
            if !line.trim().is_empty() {
                warn!("Command '{}' rejected: {}", line, e);
            }
            Reply::from(e)
        }
    }
}

fn execute(
    state: &mut SessionState,
    ctx: &SessionContext,
    command: Command,
) -> Result<Reply, CommandError> {
    let filters = &mut state.filters;
    let reply = match command {
        Command::Maintenance(maintenance) => {
            if maintenance.clears_previous() {
                state.previous_command.clear();
            }
            Reply::from(ctx.control.execute(&maintenance))
        }
        Command::Simulation(true) => {
            ctx.simulator.start();
            Reply::Silent
        }
        Command::Simulation(false) => {
            ctx.simulator.stop();
            Reply::Silent
        }

        Command::StVersion => Reply::Line(ident::ST_VERSION.to_string()),
        Command::ListFilters => Reply::Lines(filters.describe()),
        Command::ClearAllFilters => {
            filters.pass.clear();
            filters.block.clear();
            Reply::Ok
        }
        Command::AddPassFilter(rule) => {
            info!("Add pass filter pattern=0x{:03X} mask=0x{:03X}", rule.pattern, rule.mask);
            filters.pass.push(rule)?;
            Reply::Ok
        }
        Command::ClearPassFilters => {
            filters.pass.clear();
            Reply::Ok
        }
        Command::AddBlockFilter(rule) => {
            info!("Add block filter pattern=0x{:03X} mask=0x{:03X}", rule.pattern, rule.mask);
            filters.block.push(rule)?;
            Reply::Ok
        }
        Command::ClearBlockFilters => {
            filters.block.clear();
            Reply::Ok
        }
        Command::MonitorFiltered | Command::MonitorAll => Reply::StartMonitor,

        Command::DeviceDescription => Reply::Line(ident::DEVICE_DESCRIPTION.to_string()),
        Command::ReadIdentifier => Reply::Line(state.device_identifier.clone()),
        Command::SetIdentifier(identifier) => {
            info!("Set device identifier to \"{}\"", identifier);
            state.device_identifier = identifier;
            Reply::Ok
        }
        Command::AllowLongMessages => {
            state.long_message = true;
            Reply::Ok
        }
        Command::AdaptiveTiming(mode) => {
            state.adaptive_timing = mode;
            Reply::Ok
        }
        Command::CanAutoFormat(on) => {
            state.can_auto_format = on;
            Reply::Ok
        }
        Command::CanFlowControl(on) => {
            state.can_flow_control = on;
            Reply::Ok
        }
        Command::CanFilter(pattern) => {
            filters.at_filter.pattern = pattern;
            Reply::Ok
        }
        Command::CanMask(mask) => {
            filters.at_filter.mask = mask;
            Reply::Ok
        }
        Command::ResetReceiveFilter => {
            filters.at_filter = FilterRule::MATCH_ALL;
            Reply::Ok
        }
        Command::SetReceiveFilter(rule) => {
            info!("Set receive filter=0x{:X} mask=0x{:X}", rule.pattern, rule.mask);
            filters.at_filter = rule;
            Reply::Ok
        }
        Command::CanStatus => Reply::Line("STARTED".to_string()),
        Command::CanSilentMode(on) => {
            state.can_silent_mode = on;
            Reply::Ok
        }
        Command::Defaults => {
            state.reset();
            Reply::Ok
        }
        Command::ShowDlc(on) => {
            state.dlc = on;
            Reply::Ok
        }
        Command::DescribeProtocol => Reply::Line(format!(
            "{}{}",
            if state.protocol_auto { "Auto, " } else { "" },
            state.protocol.description()
        )),
        Command::DescribeProtocolNumber => Reply::Line(format!(
            "{}{}",
            if state.protocol_auto { "A" } else { "" },
            state.protocol.selector()
        )),
        Command::Echo(on) => {
            state.echo = on;
            Reply::Ok
        }
        Command::Headers(on) => {
            state.headers = on;
            Reply::Ok
        }
        Command::Version => Reply::Line(ident::ELM_VERSION.to_string()),
        Command::Linefeed(on) => {
            state.linefeed = on;
            Reply::Ok
        }
        Command::Memory(on) => {
            state.memory = on;
            Reply::Ok
        }
        Command::MonitorReceiver(address) => {
            let rule = &mut filters.at_filter;
            rule.pattern = (rule.pattern & 0xFFFF_FF00) | (address & 0xFF);
            rule.mask |= 0xFF;
            info!("Monitor for receiver filter=0x{:X} mask=0x{:X}", rule.pattern, rule.mask);
            Reply::StartMonitor
        }
        Command::MonitorTransmitter(address) => {
            let rule = &mut filters.at_filter;
            rule.pattern = (rule.pattern & 0xFF) | (address & 0xFFFF_FF00);
            rule.mask |= 0xFFFF_FF00;
            info!("Monitor for transmitter filter=0x{:X} mask=0x{:X}", rule.pattern, rule.mask);
            Reply::StartMonitor
        }
        Command::Responses(_) => Reply::Ok,
        Command::Spaces(on) => {
            state.spaces = on;
            Reply::Ok
        }
        Command::SetProtocol { protocol, auto } | Command::TryProtocol { protocol, auto } => {
            info!("Set protocol {}{}", if auto { "auto " } else { "" }, protocol.selector());
            state.protocol = protocol;
            state.protocol_auto = auto;
            Reply::Ok
        }
        Command::SetTimeout(ms) => {
            state.timeout_ms = ms;
            Reply::Ok
        }
        Command::WarmStart | Command::ResetAll => {
            state.reset();
            Reply::Line(ident::ELM_VERSION.to_string())
        }
    };
    Ok(reply)
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    End,
}

/// Interpreter bound to one transport
pub struct Session {
    ctx: Arc<SessionContext>,
    label: String,
    state: SessionState,
    line: String,
    writer: Option<Box<dyn TransportWriter>>,
    monitor: Option<MonitorHandle>,
}

impl Session {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            label: String::new(),
            state: SessionState::new(),
            line: String::with_capacity(LINE_CAPACITY),
            writer: None,
            monitor: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Serve the transport until EOT, end of stream or a write failure
    pub async fn run(mut self, transport: Box<dyn Transport>) -> Result<(), SessionError> {
        self.label = transport.label().to_string();
        info!(session = %self.label, "Session started");

        let (mut reader, writer) = transport.split();
        self.writer = Some(writer);

        let served = self.serve(reader.as_mut()).await;
        let closed = self.shutdown().await;
        info!(session = %self.label, "Session ended");
        served.and(closed)
    }

    async fn serve(&mut self, reader: &mut dyn TransportReader) -> Result<(), SessionError> {
        self.send(token::PROMPT).await?;
        let mut buf = [0u8; READ_CHUNK];
        while let Some(read) = self.read_input(reader, &mut buf).await? {
            for &byte in &buf[..read] {
                if self.handle_byte(byte).await? == Flow::End {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Wait for input. While a monitor runs, wake every poll interval to
    /// reclaim the writer from a monitor that ended on its own. `None` is
    /// end of stream.
    async fn read_input(
        &mut self,
        reader: &mut dyn TransportReader,
        buf: &mut [u8],
    ) -> Result<Option<usize>, SessionError> {
        loop {
            let wait = self
                .state
                .monitor_active
                .then_some(self.ctx.monitor.poll_interval);
            match reader.read(buf, wait).await {
                Ok(0) => self.reap_monitor().await?,
                Ok(read) => return Ok(Some(read)),
                Err(TransportError::Closed) => {
                    info!(session = %self.label, "Stop on EOF");
                    return Ok(None);
                }
                Err(e) => {
                    warn!(session = %self.label, "Read failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    async fn handle_byte(&mut self, byte: u8) -> Result<Flow, SessionError> {
        match byte {
            0 => return Ok(Flow::Continue),
            EOT => {
                info!(session = %self.label, "Stop on ctrl-D");
                return Ok(Flow::End);
            }
            _ => {}
        }

        if self.state.monitor_active {
            debug!(session = %self.label, "Byte 0x{:02X} received, stopping monitor", byte);
            self.stop_monitor().await?;
        }

        match byte {
            BACKSPACE | DELETE => {
                if self.line.pop().is_some() && self.state.echo {
                    self.send("\x08 \x08").await?;
                }
            }
            CR => self.submit().await?,
            LF => {}
            b if b < b' ' => {}
            b => {
                // Each input byte is one char; bytes above 0x7F take two in UTF-8
                if self.line.chars().count() < LINE_CAPACITY {
                    self.line.push(char::from(b));
                    if self.state.echo {
                        self.send_bytes(&[b]).await?;
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn submit(&mut self) -> Result<(), SessionError> {
        let newline = self.state.newline();
        self.send(&format!("{newline}{newline}")).await?;

        let line = std::mem::take(&mut self.line);
        let reply = interpret(&mut self.state, &self.ctx, &line);
        self.respond(reply).await?;

        if !self.state.monitor_active {
            self.send(token::PROMPT).await?;
        }
        Ok(())
    }

    async fn respond(&mut self, reply: Reply) -> Result<(), SessionError> {
        match reply {
            Reply::Silent => Ok(()),
            Reply::Ok => self.send_line(token::OK).await,
            Reply::Error => self.send_line(token::ERROR).await,
            Reply::Unknown => self.send_line(token::UNKNOWN).await,
            Reply::Line(text) => self.send_line(&text).await,
            Reply::Lines(lines) => {
                for text in &lines {
                    self.send_line(text).await?;
                }
                Ok(())
            }
            Reply::StartMonitor => self.start_monitor(),
        }
    }

    fn start_monitor(&mut self) -> Result<(), SessionError> {
        let writer = self.writer.take().ok_or(TransportError::Closed)?;
        info!(session = %self.label, "Start monitor");
        self.monitor = Some(spawn_monitor(
            self.ctx.registry.clone(),
            self.state.filters.clone(),
            self.state.display(),
            self.state.monitor_timeout(),
            self.ctx.monitor,
            writer,
        ));
        self.state.monitor_active = true;
        Ok(())
    }

    async fn stop_monitor(&mut self) -> Result<(), SessionError> {
        let Some(handle) = self.monitor.take() else {
            return Ok(());
        };
        let (writer, exit) = handle.stop().await?;
        self.writer = Some(writer);
        self.state.monitor_active = false;
        if exit == MonitorExit::WriteFailed {
            warn!(session = %self.label, "Monitor lost the output stream");
        }
        Ok(())
    }

    async fn reap_monitor(&mut self) -> Result<(), SessionError> {
        if self.monitor.as_ref().is_some_and(MonitorHandle::is_finished) {
            debug!(session = %self.label, "Monitor ended on its own");
            self.stop_monitor().await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.stop_monitor().await?;
        if let Some(mut writer) = self.writer.take() {
            writer.close().await?;
        }
        Ok(())
    }

    async fn send_line(&mut self, text: &str) -> Result<(), SessionError> {
        let line = format!("{}{}", text, self.state.newline());
        self.send(&line).await
    }

    async fn send(&mut self, text: &str) -> Result<(), SessionError> {
        self.send_bytes(text.as_bytes()).await
    }

    async fn send_bytes(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        write_all(writer.as_mut(), data).await?;
        Ok(())
    }
}
