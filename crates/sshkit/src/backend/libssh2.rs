//! libssh2 connector.

use super::{Connector, ExecResult, Session};
use crate::error::{Error, Result};
use crate::types::HostTarget;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

const READ_CHUNK: usize = 32 * 1024;

const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Connector backed by the `ssh2` crate.
#[derive(Debug, Clone)]
pub struct Ssh2Connector {
    connect_timeout: Duration,
}

impl Default for Ssh2Connector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Ssh2Connector {
    /// Create a connector with the default 10s connect timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn open_tcp(&self, target: &HostTarget) -> Result<TcpStream> {
        let connect_err = |message: String| Error::Connect {
            host: target.host.clone(),
            message,
        };

        let addrs = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?;

        let mut last = String::from("no address resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last = e.to_string(),
            }
        }
        Err(connect_err(last))
    }
}

impl Connector for Ssh2Connector {
    fn connect(&self, target: &HostTarget, private_key: &str) -> Result<Box<dyn Session>> {
        if !private_key.contains("PRIVATE KEY") {
            return Err(Error::InvalidKey("not a PEM private key".to_string()));
        }

        let tcp = self.open_tcp(target)?;

        let mut session = ssh2::Session::new().map_err(|e| Error::Session {
            host: target.host.clone(),
            message: e.to_string(),
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| Error::Connect {
            host: target.host.clone(),
            message: e.to_string(),
        })?;

        session
            .userauth_pubkey_memory(&target.username, None, private_key, None)
            .map_err(|e| Error::Auth {
                host: target.host.clone(),
                username: target.username.clone(),
                message: e.to_string(),
            })?;

        if !session.authenticated() {
            return Err(Error::Auth {
                host: target.host.clone(),
                username: target.username.clone(),
                message: "server did not accept the key".to_string(),
            });
        }

        Ok(Box::new(Ssh2Session {
            host: target.host.clone(),
            inner: session,
        }))
    }
}

struct Ssh2Session {
    host: String,
    inner: ssh2::Session,
}

impl Ssh2Session {
    fn session_err(&self, e: impl ToString) -> Error {
        Error::Session {
            host: self.host.clone(),
            message: e.to_string(),
        }
    }
}

impl Session for Ssh2Session {
    fn exec(&mut self, command: &str) -> Result<ExecResult> {
        let mut channel = self
            .inner
            .channel_session()
            .map_err(|e| self.session_err(e))?;
        channel.exec(command).map_err(|e| self.session_err(e))?;

        let mut stdout = channel.stream(0);
        let mut stderr = channel.stderr();
        self.inner.set_blocking(false);
        let output = read_interleaved(&mut stdout, &mut stderr, || channel.eof());
        self.inner.set_blocking(true);
        let (stdout, stderr) = output.map_err(|e| self.session_err(e))?;

        channel.wait_close().map_err(|e| self.session_err(e))?;
        let exit_status = channel.exit_status().map_err(|e| self.session_err(e))?;

        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }
}

/// Read stdout and stderr in turn until `finished` reports the channel drained.
///
/// Both streams share one channel window, so a command that fills stderr
/// stalls until stderr is read, whatever is pending on stdout.
fn read_interleaved<O: Read, E: Read>(
    stdout: &mut O,
    stderr: &mut E,
    mut finished: impl FnMut() -> bool,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let read = pull(stdout, &mut buf, &mut out)? + pull(stderr, &mut buf, &mut err)?;
        if read == 0 {
            if finished() {
                return Ok((out, err));
            }
            thread::sleep(IDLE_WAIT);
        }
    }
}

/// One non-blocking read; nothing available counts as zero bytes
fn pull(reader: &mut impl Read, buf: &mut [u8], into: &mut Vec<u8>) -> io::Result<usize> {
    match reader.read(buf) {
        Ok(n) => {
            into.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(0)
        }
        Err(e) => Err(e),
    }
}
