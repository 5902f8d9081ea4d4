//! Unix Socket Server
//!
//! Serves the arbiter to unprivileged clients over newline-delimited JSON.
//!
//! - Socket is recreated on startup, never followed through a symlink
//! - Concurrent connections are capped
//! - Every line is bounded by [`MAX_MESSAGE_SIZE`] before it is buffered,
//!   in both directions
//! - Requests run on the blocking pool; they take the registry lock and may
//!   touch sysfs
//! - Reads and writes time out
//! - Mutating requests are audit-logged with peer credentials

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use hp_core::{Attribute, ControlSurface, DescriptorRef, Hotplugger, ResolutionReport};
use hp_error::{ErrorKind, HotplugError};
use hp_protocol::{
    DriverInfo, Request, RequestEnvelope, ResolutionSummary, Response, ResponseData,
    ResponseEnvelope, MAX_MESSAGE_SIZE,
};

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 32;

/// Read timeout per message
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per message
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Owner and group may talk to the daemon
const SOCKET_MODE: u32 = 0o660;

/// Sent when a response cannot be serialized at all
const SERIALIZATION_ERROR: &str =
    r#"{"id":0,"status":"error","kind":"ipc","message":"Serialization error"}"#;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// What a request handler needs from the daemon
#[derive(Clone, Copy)]
pub struct ServerContext {
    pub hotplugger: &'static Hotplugger,
    pub show_buffer_len: usize,
}

impl ServerContext {
    fn surface(&self) -> ControlSurface<'static> {
        ControlSurface::with_buffer_len(self.hotplugger, self.show_buffer_len)
    }
}

/// Client credentials from Unix socket peer
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerCredentials {
    uid: u32,
    gid: u32,
    pid: i32,
}

async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    out.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(0);
        }

        let mut take_len = available.len();
        let mut found_newline = false;
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            take_len = pos + 1;
            found_newline = true;
        }

        let remaining = max_len.saturating_sub(out.len());
        if take_len > remaining {
            let consume_len = remaining.min(available.len());
            reader.consume(consume_len);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

/// Run the Unix socket server until SIGINT or SIGTERM
pub async fn run_server(socket_path: &str, ctx: ServerContext) -> anyhow::Result<()> {
    let path = Path::new(socket_path);

    if path.exists() {
        let metadata = path.symlink_metadata()?;
        if metadata.file_type().is_symlink() {
            anyhow::bail!("Socket path {} is a symlink, refusing", socket_path);
        }
        std::fs::remove_file(path)?;
        debug!("Removed stale socket file");
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;

    info!("Listening on {} (mode {:o})", socket_path, SOCKET_MODE);
    info!("Limits: max_conn={}, max_msg={}", MAX_CONNECTIONS, MAX_MESSAGE_SIZE);

    let mut terminate = signal(SignalKind::terminate())?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let current = ACTIVE_CONNECTIONS.load(Ordering::SeqCst);
                        if current >= MAX_CONNECTIONS {
                            warn!("Connection limit reached ({}), rejecting new connection", current);
                            drop(stream);
                            continue;
                        }

                        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            handle_client(stream, ctx).await;
                            ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("SIGNAL: SIGINT received, shutting down");
                break;
            }
            _ = terminate.recv() => {
                info!("SIGNAL: SIGTERM received, shutting down");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    info!("Server stopped");
    Ok(())
}

async fn handle_client(stream: UnixStream, ctx: ServerContext) {
    let cred = get_peer_credentials(&stream).unwrap_or_default();
    debug!(
        "Connection from uid={}, gid={}, pid={}",
        cred.uid, cred.gid, cred.pid
    );

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(MAX_MESSAGE_SIZE);
    let mut request_count: u64 = 0;
    let connection_start = Instant::now();

    loop {
        let read_result = timeout(
            READ_TIMEOUT,
            read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE),
        )
        .await;

        match read_result {
            Ok(Ok(0)) => {
                debug!(
                    "Client disconnected: pid={}, requests={}, duration={:?}",
                    cred.pid,
                    request_count,
                    connection_start.elapsed()
                );
                break;
            }
            Ok(Ok(n)) => {
                request_count += 1;
                trace!("Request #{} from pid={}: {} bytes", request_count, cred.pid, n);

                let response = match String::from_utf8(std::mem::take(&mut line)) {
                    Ok(s) => process_request_blocking(s, cred, ctx).await,
                    Err(_) => ResponseEnvelope::new(
                        0,
                        Response::error(ErrorKind::Ipc, "Invalid request encoding"),
                    ),
                };
                if send_response(&mut writer, &response).await.is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    warn!(
                        "Message too large (>{} bytes) from pid={}",
                        MAX_MESSAGE_SIZE, cred.pid
                    );
                    let response = ResponseEnvelope::new(
                        0,
                        Response::error(ErrorKind::Ipc, "Message too large"),
                    );
                    let _ = send_response(&mut writer, &response).await;
                } else {
                    error!("Read error from pid={}: {}", cred.pid, e);
                }
                break;
            }
            Err(_) => {
                debug!("Read timeout for pid={}", cred.pid);
                let response =
                    ResponseEnvelope::new(0, Response::error(ErrorKind::Timeout, "Read timeout"));
                let _ = send_response(&mut writer, &response).await;
                break;
            }
        }
    }
}

/// Run [`process_request`] off the executor thread
async fn process_request_blocking(
    line: String,
    cred: PeerCredentials,
    ctx: ServerContext,
) -> ResponseEnvelope {
    tokio::task::spawn_blocking(move || process_request(&line, &cred, ctx))
        .await
        .unwrap_or_else(|e| {
            error!("Request task for pid={} panicked: {}", cred.pid, e);
            ResponseEnvelope::new(0, Response::error(ErrorKind::Ipc, "Internal error"))
        })
}

/// Serialize one response frame. A response the client would reject as
/// oversized is replaced by an `ipc` error carrying the same id.
fn encode_response(response: &ResponseEnvelope) -> String {
    let json = match serde_json::to_string(response) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize response {}: {}", response.id, e);
            return SERIALIZATION_ERROR.to_string();
        }
    };

    // the trailing newline counts against the frame
    if json.len() < MAX_MESSAGE_SIZE {
        return json;
    }

    warn!(
        "Response to request {} is {} bytes, over the {} byte frame limit",
        response.id,
        json.len(),
        MAX_MESSAGE_SIZE
    );
    let replacement = ResponseEnvelope::new(
        response.id,
        Response::error(
            ErrorKind::Ipc,
            format!(
                "Response too large ({} bytes, limit {})",
                json.len(),
                MAX_MESSAGE_SIZE
            ),
        ),
    );
    serde_json::to_string(&replacement).unwrap_or_else(|_| SERIALIZATION_ERROR.to_string())
}

async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response: &ResponseEnvelope,
) -> Result<(), ()> {
    let json = encode_response(response);

    let write_result = timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok::<_, std::io::Error>(())
    })
    .await;

    match write_result {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => {
            error!("Write error: {}", e);
            Err(())
        }
        Err(_) => {
            error!("Write timeout");
            Err(())
        }
    }
}

fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();
        // SAFETY: ucred is a plain C struct, all-zero is a valid value.
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: fd is a live socket owned by `stream`, cred and len
        // describe a buffer of the right size.
        let result = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };

        if result == 0 {
            return Some(PeerCredentials {
                uid: cred.uid,
                gid: cred.gid,
                pid: cred.pid,
            });
        }
        None
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = stream;
        None
    }
}

/// Parse, validate and execute one request line
pub fn process_request(line: &str, cred: &PeerCredentials, ctx: ServerContext) -> ResponseEnvelope {
    let envelope: RequestEnvelope = match serde_json::from_str(line.trim()) {
        Ok(e) => e,
        Err(e) => {
            debug!("Invalid JSON from pid={}: {}", cred.pid, e);
            return ResponseEnvelope::new(
                0,
                Response::error(ErrorKind::Ipc, "Invalid request format"),
            );
        }
    };

    let id = envelope.id;
    let request = envelope.request;

    if let Err(e) = request.validate() {
        warn!("Rejected {} from pid={}: {}", request.type_name(), cred.pid, e);
        return ResponseEnvelope::new(id, Response::error(ErrorKind::InvalidArgument, e));
    }

    if request.is_mutating() {
        info!(
            "AUDIT: {} from uid={}, gid={}, pid={}",
            request.type_name(),
            cred.uid,
            cred.gid,
            cred.pid
        );
    }

    let response = match dispatch(&request, ctx) {
        Ok(data) => Response::Ok(data),
        Err(e) => {
            debug!("{} failed: {}", request.type_name(), e);
            Response::from_error(&e)
        }
    };
    ResponseEnvelope::new(id, response)
}

fn dispatch(request: &Request, ctx: ServerContext) -> Result<ResponseData, HotplugError> {
    let hp = ctx.hotplugger;
    match request {
        Request::Ping => Ok(ResponseData::string("pong".into())),
        Request::Version => Ok(ResponseData::string(env!("CARGO_PKG_VERSION").into())),
        Request::Show { attribute } => {
            let attr: Attribute = attribute.parse()?;
            Ok(ResponseData::string(ctx.surface().show(attr)))
        }
        Request::Store { attribute, value } => {
            let attr: Attribute = attribute.parse()?;
            ctx.surface().store(attr, value).map(ResponseData::stored)
        }
        Request::ListDrivers => Ok(ResponseData::driver_list(list_drivers(hp))),
        Request::EnableDriver { name } => hp
            .enable_one(name)
            .map(|t| ResponseData::transition(t.is_applied())),
        Request::DisableDriver { name } => hp
            .disable_one(name)
            .map(|t| ResponseData::transition(t.is_applied())),
        Request::ResolveConflicts { name } => hp
            .resolve_conflicts_for(name)
            .map(|r| ResponseData::resolved(summarize(r))),
        Request::GetGate => Ok(ResponseData::gate(hp.is_open())),
        Request::SetGate { open } => {
            hp.set_open(*open);
            Ok(ResponseData::gate(*open))
        }
    }
}

fn list_drivers(hp: &Hotplugger) -> Vec<DriverInfo> {
    let mut drivers = Vec::new();
    hp.registry().for_each(|_| true, |d: &DescriptorRef| {
        drivers.push(DriverInfo {
            name: d.name().to_string(),
            enabled: d.is_enabled(),
            can_transition: d.can_transition(),
            whitelist: d.whitelist().iter().map(|w| w.to_string()).collect(),
        });
    });
    drivers
}

fn summarize(report: ResolutionReport) -> ResolutionSummary {
    ResolutionSummary {
        requester: report.requester,
        disabled: report.disabled,
        exempt: report.exempt,
        untouched: report.untouched,
    }
}
