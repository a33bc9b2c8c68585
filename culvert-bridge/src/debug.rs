//! Debug-UART bridge (`debug`): a line-oriented protocol against a BMC ROM
//! coerced into its debug monitor, reached either over a local serial
//! device or a Digi Portserver TS-16 terminal server. Grounded on
//! `src/bridge/debug.c` and `src/tty.c`.
//!
//! The reply parser is kept as a small state machine (`Prompt`) with
//! explicit `expect`/`gets`/`write`/`run` primitives rather than inlined
//! read loops, per the design note that the retry-from-address behaviour
//! on parse failure must be preserved verbatim.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use culvert_ahb::{AhbError, AhbHandle, AhbOps};

use crate::{BridgeDriver, DebugParams, ProbeArgs};

const ENV_PASSWORD: &str = "AST_DEBUG_PASSWORD";
const ENTER_BAUD: u32 = 1200;
const NORMAL_BAUD: u32 = 115_200;
const PROMPT: &str = "$ ";
const DEBUG_D_MAX_LEN: usize = 128 * 1024;
const DEBUG_CMD_U_MAX: usize = 128;

/// A byte-stream connection to the BMC's debug console, plus (for the
/// TS-16 case) the ability to reprogram the line's baud rate.
pub trait DebugConsole: Read + Write {
    fn set_baud(&mut self, baud: u32) -> Result<(), AhbError>;
}

/// A local serial device (`/dev/ttyUSBx` and the like).
pub struct TtyConsole {
    file: std::fs::File,
}

impl TtyConsole {
    pub fn open(path: &str) -> Result<Self, AhbError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| AhbError::io(format!("{path}: {e}")))?;
        Ok(TtyConsole { file })
    }
}

impl Read for TtyConsole {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for TtyConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl DebugConsole for TtyConsole {
    fn set_baud(&mut self, baud: u32) -> Result<(), AhbError> {
        use std::os::unix::io::AsRawFd;
        let speed = match baud {
            1200 => libc::B1200,
            115_200 => libc::B115200,
            _ => return Err(AhbError::invalid_argument(format!("unsupported baud {baud}"))),
        };
        unsafe {
            let fd = self.file.as_raw_fd();
            let mut tio: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut tio) != 0 {
                return Err(AhbError::from(io::Error::last_os_error()));
            }
            libc::cfsetispeed(&mut tio, speed);
            libc::cfsetospeed(&mut tio, speed);
            if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
                return Err(AhbError::from(io::Error::last_os_error()));
            }
        }
        Ok(())
    }
}

/// A Digi Portserver TS-16 terminal-server session: control of the line's
/// baud rate is itself issued over the same TCP console connection using
/// the terminal server's own in-band command syntax.
pub struct Ts16Console {
    stream: TcpStream,
}

impl Ts16Console {
    pub fn connect(
        ip: &str,
        port: u16,
        _username: &str,
        _password: &str,
    ) -> Result<Self, AhbError> {
        let stream = TcpStream::connect((ip, port))
            .map_err(|e| AhbError::io(format!("connecting to {ip}:{port}: {e}")))?;
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .map_err(AhbError::from)?;
        Ok(Ts16Console { stream })
    }
}

impl Read for Ts16Console {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for Ts16Console {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl DebugConsole for Ts16Console {
    fn set_baud(&mut self, baud: u32) -> Result<(), AhbError> {
        // The TS-16's control channel accepts `set line baud <rate>`-style
        // commands in-band; we issue it as a bare write and do not expect
        // a reply (the terminal server does not echo control commands).
        write!(self.stream, "set line baud {baud}\r").map_err(AhbError::from)?;
        Ok(())
    }
}

/// The line-oriented prompt FSM: `write`, `run`, `expect`, `gets`.
pub struct Prompt<C: DebugConsole> {
    console: C,
    pending: Vec<u8>,
}

impl<C: DebugConsole> Prompt<C> {
    pub fn new(console: C) -> Self {
        Prompt {
            console,
            pending: Vec::new(),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), AhbError> {
        self.console.write_all(bytes).map_err(AhbError::from)
    }

    /// Writes `cmd` followed by a carriage return.
    pub fn run(&mut self, cmd: &str) -> Result<(), AhbError> {
        self.write(cmd.as_bytes())?;
        self.write(b"\r")
    }

    fn fill(&mut self) -> Result<(), AhbError> {
        let mut buf = [0u8; 256];
        let n = self.console.read(&mut buf).map_err(AhbError::from)?;
        if n == 0 {
            return Err(AhbError::IoFailure("debug console EOF".into()));
        }
        self.pending.extend_from_slice(&buf[..n]);
        Ok(())
    }

    /// Reads until `token` appears in the stream, discarding everything
    /// up to and including it.
    pub fn expect(&mut self, token: &str) -> Result<(), AhbError> {
        loop {
            if let Some(pos) = find_subslice(&self.pending, token.as_bytes()) {
                self.pending.drain(..pos + token.len());
                return Ok(());
            }
            self.fill()?;
        }
    }

    /// Reads and consumes one line (up to and including `\r` or `\n`),
    /// returning it without the terminator.
    pub fn gets(&mut self) -> Result<String, AhbError> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\r' || b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                return Ok(String::from_utf8_lossy(line).trim().to_string());
            }
            self.fill()?;
        }
    }

    pub fn set_baud(&mut self, baud: u32) -> Result<(), AhbError> {
        self.console.set_baud(baud)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reassembles the four space-separated 8-hex-digit words of a `d`-command
/// reply line (`<addr>:w0 w1 w2 w3`) into bytes, each word little-endian.
fn parse_d_line(line: &str) -> Option<(u32, [u8; 16])> {
    let (addr_s, rest) = line.split_once(':')?;
    let addr = u32::from_str_radix(addr_s.trim(), 16).ok()?;
    let mut out = [0u8; 16];
    for (i, word) in rest.split_whitespace().take(4).enumerate() {
        if word.len() != 8 {
            return None;
        }
        let v = u32::from_str_radix(word, 16).ok()?;
        out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
    Some((addr, out))
}

pub struct DebugBridge<C: DebugConsole> {
    prompt: Prompt<C>,
}

impl<C: DebugConsole> DebugBridge<C> {
    pub fn enter(console: C) -> Result<Self, AhbError> {
        let password = std::env::var(ENV_PASSWORD).map_err(|_| {
            AhbError::not_supported(format!("{ENV_PASSWORD} not set"))
        })?;
        let mut prompt = Prompt::new(console);
        let result = (|| -> Result<(), AhbError> {
            prompt.set_baud(ENTER_BAUD)?;
            prompt.write(password.as_bytes())?;
            prompt.write(b"\r")?;
            prompt.expect(PROMPT)?;
            Ok(())
        })();
        if let Err(e) = result {
            let _ = prompt.set_baud(NORMAL_BAUD);
            let _ = prompt.run("");
            return Err(e);
        }
        prompt.set_baud(NORMAL_BAUD)?;
        std::thread::sleep(Duration::from_secs(1));
        Ok(DebugBridge { prompt })
    }

    pub fn exit(mut self) -> Result<(), AhbError> {
        self.prompt.run("q")?;
        std::thread::sleep(Duration::from_secs(1));
        let _ = self.prompt.run("");
        self.prompt.set_baud(ENTER_BAUD)
    }

    fn read_byte(&mut self, addr: u32) -> Result<u8, AhbError> {
        self.prompt.run(&format!("i {addr:x}"))?;
        self.prompt.expect(PROMPT)?;
        let line = self.prompt.gets()?;
        let line = line.split_once(':').map(|(_, v)| v).unwrap_or(&line);
        u8::from_str_radix(line.trim(), 16)
            .map_err(|_| AhbError::ProtocolViolation(format!("bad byte reply: {line}")))
    }

    fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), AhbError> {
        self.prompt.run(&format!("o {addr:x} {value:02x}"))?;
        self.prompt.expect(PROMPT)
    }

    fn read_bulk(&mut self, phys: u32, buf: &mut [u8]) -> Result<(), AhbError> {
        let mut addr = phys;
        let mut off = 0;
        while off < buf.len() {
            let chunk = (buf.len() - off).min(DEBUG_D_MAX_LEN);
            'retry: loop {
                self.prompt.run(&format!("d {addr:x} {chunk:x}"))?;
                // discard the echoed command line
                let _ = self.prompt.gets();
                let mut written = 0;
                loop {
                    let line = self.prompt.gets()?;
                    if line.trim() == PROMPT.trim() || line.is_empty() {
                        break;
                    }
                    match parse_d_line(&line) {
                        Some((_, words)) => {
                            let n = (chunk - written).min(16);
                            buf[off + written..off + written + n]
                                .copy_from_slice(&words[..n]);
                            written += n;
                            if written >= chunk {
                                break;
                            }
                        }
                        None => {
                            log::warn!("debug: retry-from-address after parse failure at {addr:#x}");
                            let _ = self.prompt.run("");
                            self.prompt.expect(PROMPT)?;
                            continue 'retry;
                        }
                    }
                }
                break;
            }
            addr = addr.wrapping_add(chunk as u32);
            off += chunk;
        }
        Ok(())
    }

    fn write_bulk(&mut self, phys: u32, buf: &[u8]) -> Result<(), AhbError> {
        let mut addr = phys;
        let mut off = 0;
        while off < buf.len() {
            let chunk = (buf.len() - off).min(DEBUG_CMD_U_MAX);
            self.prompt.run(&format!("u {addr:x} {chunk:x}"))?;
            self.prompt.write(&buf[off..off + chunk])?;
            self.prompt.expect(PROMPT)?;
            addr = addr.wrapping_add(chunk as u32);
            off += chunk;
        }
        Ok(())
    }
}

impl<C: DebugConsole> AhbOps for DebugBridge<C> {
    fn read(&mut self, phys: u32, buf: &mut [u8]) -> Result<usize, AhbError> {
        if buf.len() < 4 {
            for (i, addr) in (phys..).take(buf.len()).enumerate() {
                buf[i] = self.read_byte(addr)?;
            }
        } else {
            self.read_bulk(phys, buf)?;
        }
        Ok(buf.len())
    }

    fn write(&mut self, phys: u32, buf: &[u8]) -> Result<usize, AhbError> {
        if buf.len() <= 4 {
            for (i, addr) in (phys..).take(buf.len()).enumerate() {
                self.write_byte(addr, buf[i])?;
            }
        } else {
            self.write_bulk(phys, buf)?;
        }
        Ok(buf.len())
    }

    fn readl(&mut self, phys: u32) -> Result<u32, AhbError> {
        self.prompt.run(&format!("r {phys:x}"))?;
        self.prompt.expect(PROMPT)?;
        let line = self.prompt.gets()?;
        let value = line.split_once(':').map(|(_, v)| v).unwrap_or(&line);
        u32::from_str_radix(value.trim(), 16)
            .map_err(|_| AhbError::ProtocolViolation(format!("bad readl reply: {line}")))
    }

    fn writel(&mut self, phys: u32, value: u32) -> Result<(), AhbError> {
        self.prompt.run(&format!("w {phys:x} {value:x}"))?;
        // The watchdog reload register, written zero, triggers a BMC
        // reset before the prompt can ever return — skip the expect in
        // exactly that case.
        const AST_G5_WDT: u32 = 0x1e78_5000;
        const WDT_RELOAD: u32 = 0x04;
        if (phys & !0x20) == (AST_G5_WDT | WDT_RELOAD) && value == 0 {
            return Ok(());
        }
        self.prompt.expect(PROMPT)
    }
}

pub struct DebugDriver;

impl BridgeDriver for DebugDriver {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn probe(&self, args: &ProbeArgs) -> Result<Option<AhbHandle>, AhbError> {
        let Some(params) = &args.debug else {
            return Ok(None);
        };
        let handle: Box<dyn AhbOps> = match params {
            DebugParams::Tty(path) => {
                let console = TtyConsole::open(path)?;
                Box::new(DebugBridge::enter(console)?)
            }
            DebugParams::Ts16 {
                ip,
                port,
                username,
                password,
            } => {
                let console = Ts16Console::connect(ip, *port, username, password)?;
                Box::new(DebugBridge::enter(console)?)
            }
        };
        Ok(Some(AhbHandle::new(self.name(), false, handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_d_reply_line() {
        let (addr, words) = parse_d_line("1e6e207c:04030303 00000000 deadbeef cafebabe").unwrap();
        assert_eq!(addr, 0x1e6e207c);
        assert_eq!(&words[0..4], &0x04030303u32.to_le_bytes());
        assert_eq!(&words[12..16], &0xcafebabeu32.to_le_bytes());
    }

    #[test]
    fn rejects_malformed_word() {
        assert!(parse_d_line("1e6e207c:xyz").is_none());
    }

    #[test]
    fn find_subslice_locates_prompt() {
        assert_eq!(find_subslice(b"foo$ bar", b"$ "), Some(3));
        assert_eq!(find_subslice(b"no prompt here", b"$ "), None);
    }
}
