use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use backhaul_core::DestinationKind;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_kind: Option<DestinationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
}

impl DaemonRequest {
    pub fn bare(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            src: None,
            dest_kind: None,
            dest: None,
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// Query the daemon's status, retrying briefly so a just-launched daemon has
/// time to bind its socket.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::bare("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::bare("stop"))?;
    response_into_data(response).map(|_| ())
}

pub fn request_push(home: &Path) -> Result<Value, DaemonError> {
    let response = send_request(home, &DaemonRequest::bare("push"))?;
    response_into_data(response)
}

pub fn request_pull(home: &Path) -> Result<Value, DaemonError> {
    let response = send_request(home, &DaemonRequest::bare("pull"))?;
    response_into_data(response)
}

pub fn request_set_paths(
    home: &Path,
    src: PathBuf,
    dest_kind: DestinationKind,
    dest: String,
) -> Result<Value, DaemonError> {
    let response = send_request(
        home,
        &DaemonRequest {
            cmd: "set-paths".to_string(),
            src: Some(src),
            dest_kind: Some(dest_kind),
            dest: Some(dest),
        },
    )?;
    response_into_data(response)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_with_optional_fields() {
        let request = DaemonRequest {
            cmd: "set-paths".to_string(),
            src: Some(PathBuf::from("/data")),
            dest_kind: Some(DestinationKind::WebDav),
            dest: Some("https://dav.example.com/b".to_string()),
        };
        let json = serde_json::to_string(&request).expect("encode");
        let parsed: DaemonRequest = serde_json::from_str(&json).expect("decode");
        assert_eq!(parsed.cmd, "set-paths");
        assert_eq!(parsed.src, Some(PathBuf::from("/data")));
        assert_eq!(parsed.dest_kind, Some(DestinationKind::WebDav));
    }

    #[test]
    fn bare_request_omits_optional_fields() {
        let json = serde_json::to_string(&DaemonRequest::bare("status")).expect("encode");
        assert_eq!(json, r#"{"cmd":"status"}"#);
    }

    #[test]
    fn error_response_carries_message() {
        let response = DaemonResponse::error("boom");
        let err = response_into_data(response).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(message) if message == "boom"));
    }

    #[test]
    fn ok_response_yields_data() {
        let response = DaemonResponse::ok(serde_json::json!({"running": true}));
        let data = response_into_data(response).expect("data");
        assert_eq!(data["running"], serde_json::json!(true));
    }

    #[test]
    fn missing_socket_reports_not_running() {
        let home = tempfile::TempDir::new().expect("tempdir");
        let err = send_request(home.path(), &DaemonRequest::bare("status")).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }
}
