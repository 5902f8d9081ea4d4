/*
 * This file is part of Hotplugger.
 *
 * Copyright (C) 2025 Hotplugger contributors
 *
 * Hotplugger is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Hotplugger is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Hotplugger. If not, see <https://www.gnu.org/licenses/>.
 */

//! Blocking client for hotpluggerd

use std::io::{BufRead, BufReader, ErrorKind as IoErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hp_error::{HotplugError, Result};
use hp_protocol::{
    generate_request_id, DriverInfo, Request, RequestEnvelope, ResolutionSummary, ResponseData,
    ResponseEnvelope, MAX_MESSAGE_SIZE,
};

const TIMEOUT_MS: u64 = 5000;

pub struct DaemonClient {
    socket_path: PathBuf,
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl DaemonClient {
    /// Connect to the daemon at the default socket path
    pub fn connect() -> Result<Self> {
        Self::connect_to(hp_core::constants::paths::socket_path())
    }

    pub fn connect_to(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        if !socket_path.exists() {
            return Err(HotplugError::DaemonNotAvailable);
        }

        let stream = UnixStream::connect(&socket_path).map_err(|e| {
            HotplugError::DaemonConnection(format!(
                "Failed to connect to daemon at {}: {}",
                socket_path.display(),
                e
            ))
        })?;
        let timeout = Some(Duration::from_millis(TIMEOUT_MS));
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        let reader_stream = stream.try_clone()?;

        Ok(Self {
            socket_path,
            writer: stream,
            reader: BufReader::new(reader_stream),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request and wait for its response. Daemon-side failures are
    /// returned as `HotplugError::Remote`.
    pub fn request(&mut self, req: Request) -> Result<ResponseData> {
        req.validate().map_err(HotplugError::invalid_argument)?;

        let request_id = generate_request_id();
        let type_name = req.type_name();
        let envelope = RequestEnvelope::with_id(req, request_id);

        let mut json = serde_json::to_vec(&envelope)?;
        json.push(b'\n');
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(HotplugError::MessageTooLarge {
                size: json.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        self.writer.write_all(&json).map_err(io_to_ipc)?;

        let mut buf = Vec::with_capacity(512);
        let n = (&mut self.reader)
            .take(MAX_MESSAGE_SIZE as u64 + 1)
            .read_until(b'\n', &mut buf)
            .map_err(io_to_ipc)?;
        if n == 0 {
            return Err(HotplugError::DaemonConnection(
                "Daemon closed connection".to_string(),
            ));
        }
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(HotplugError::MessageTooLarge {
                size: buf.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        let response: ResponseEnvelope = serde_json::from_slice(&buf)
            .map_err(|e| HotplugError::IpcProtocol(format!("Failed to parse response: {}", e)))?;

        if response.id != request_id {
            return Err(HotplugError::IpcProtocol(format!(
                "Response ID mismatch: expected {}, got {}",
                request_id, response.id
            )));
        }

        let data = response.response.into_result()?;
        verify_response_type(type_name, &data)?;
        Ok(data)
    }

    pub fn ping(&mut self) -> Result<()> {
        self.request(Request::Ping).map(|_| ())
    }

    pub fn version(&mut self) -> Result<String> {
        self.value(Request::Version)
    }

    pub fn show(&mut self, attribute: &str) -> Result<String> {
        self.value(Request::Show {
            attribute: attribute.to_string(),
        })
    }

    pub fn store(&mut self, attribute: &str, value: &str) -> Result<usize> {
        self.request(Request::Store {
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
        .map(|d| d.consumed.unwrap_or(value.len()))
    }

    pub fn list_drivers(&mut self) -> Result<Vec<DriverInfo>> {
        self.request(Request::ListDrivers)
            .map(|d| d.drivers.unwrap_or_default())
    }

    /// Returns whether the driver actually changed state
    pub fn enable_driver(&mut self, name: &str) -> Result<bool> {
        self.request(Request::EnableDriver {
            name: name.to_string(),
        })
        .map(|d| d.applied.unwrap_or(false))
    }

    pub fn disable_driver(&mut self, name: &str) -> Result<bool> {
        self.request(Request::DisableDriver {
            name: name.to_string(),
        })
        .map(|d| d.applied.unwrap_or(false))
    }

    pub fn resolve_conflicts(&mut self, name: &str) -> Result<ResolutionSummary> {
        self.request(Request::ResolveConflicts {
            name: name.to_string(),
        })
        .map(|d| d.resolution.unwrap_or_default())
    }

    pub fn gate(&mut self) -> Result<bool> {
        self.request(Request::GetGate)
            .map(|d| d.gate_open.unwrap_or(false))
    }

    pub fn set_gate(&mut self, open: bool) -> Result<bool> {
        self.request(Request::SetGate { open })
            .map(|d| d.gate_open.unwrap_or(open))
    }

    fn value(&mut self, req: Request) -> Result<String> {
        self.request(req)?
            .value
            .ok_or_else(|| HotplugError::IpcProtocol("Unexpected response type".to_string()))
    }
}

fn io_to_ipc(e: std::io::Error) -> HotplugError {
    match e.kind() {
        IoErrorKind::WouldBlock | IoErrorKind::TimedOut => {
            HotplugError::Timeout(format!("daemon did not answer within {} ms", TIMEOUT_MS))
        }
        _ => HotplugError::DaemonConnection(e.to_string()),
    }
}

/// Reject a success response that lacks the payload the request implies
fn verify_response_type(type_name: &str, data: &ResponseData) -> Result<()> {
    let valid = match type_name {
        "Ping" | "Version" | "Show" => data.value.is_some(),
        "ListDrivers" => data.drivers.is_some(),
        "ResolveConflicts" => data.resolution.is_some(),
        "GetGate" | "SetGate" => data.gate_open.is_some(),
        "EnableDriver" | "DisableDriver" => data.applied.is_some(),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(HotplugError::IpcProtocol(format!(
            "Response type mismatch for request {}",
            type_name
        )))
    }
}

/// Check if daemon is available (socket exists)
pub fn is_daemon_available() -> bool {
    Path::new(&hp_core::constants::paths::socket_path()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hp_error::ErrorKind;
    use hp_protocol::Response;
    use std::os::unix::net::UnixListener;
    use tempfile::TempDir;

    /// Answer `count` requests on `listener` with `respond`
    fn serve_for_tests<F>(listener: UnixListener, count: usize, respond: F)
    where
        F: Fn(Request) -> Response + Send + 'static,
    {
        std::thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let Ok(read_half) = stream.try_clone() else {
                return;
            };
            let mut reader = BufReader::new(read_half);
            let mut writer = stream;
            for _ in 0..count {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let Ok(env) = serde_json::from_str::<RequestEnvelope>(&line) else {
                    return;
                };
                let reply = ResponseEnvelope::new(env.id, respond(env.request));
                let Ok(mut out) = serde_json::to_vec(&reply) else {
                    return;
                };
                out.push(b'\n');
                if writer.write_all(&out).is_err() {
                    return;
                }
            }
        });
    }

    fn fake_daemon<F>(count: usize, respond: F) -> (TempDir, PathBuf)
    where
        F: Fn(Request) -> Response + Send + 'static,
    {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hp.sock");
        let listener = UnixListener::bind(&path).unwrap();
        serve_for_tests(listener, count, respond);
        (dir, path)
    }

    #[test]
    fn test_missing_socket() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DaemonClient::connect_to(dir.path().join("absent.sock")),
            Err(HotplugError::DaemonNotAvailable)
        ));
    }

    #[test]
    fn test_round_trip() {
        let (_dir, path) = fake_daemon(2, |req| match req {
            Request::Version => Response::ok_string("9.9.9"),
            Request::GetGate => Response::Ok(ResponseData::gate(true)),
            _ => Response::ok(),
        });
        let mut client = DaemonClient::connect_to(&path).unwrap();
        assert_eq!(client.version().unwrap(), "9.9.9");
        assert!(client.gate().unwrap());
    }

    #[test]
    fn test_remote_error_keeps_kind() {
        let (_dir, path) = fake_daemon(1, |_| {
            Response::error(ErrorKind::Busy, "registry busy after 2 attempts")
        });
        let mut client = DaemonClient::connect_to(&path).unwrap();
        let err = client.resolve_conflicts("alucard").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_payload_mismatch_is_protocol_error() {
        let (_dir, path) = fake_daemon(1, |_| Response::ok());
        let mut client = DaemonClient::connect_to(&path).unwrap();
        assert!(matches!(
            client.list_drivers(),
            Err(HotplugError::IpcProtocol(_))
        ));
    }

    #[test]
    fn test_invalid_request_never_sent() {
        let (_dir, path) = fake_daemon(0, |_| Response::ok());
        let mut client = DaemonClient::connect_to(&path).unwrap();
        assert!(matches!(
            client.enable_driver(""),
            Err(HotplugError::InvalidArgument(_))
        ));
    }
}
