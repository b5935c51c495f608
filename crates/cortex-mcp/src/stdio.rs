//! Blocking stdio transport: one JSON-RPC frame per line.

use std::io::{self, BufRead, BufReader, Write};

use tracing::{debug, error, warn};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::QueryServer;

/// Serve requests from stdin until EOF. Hooks and the host client both
/// speak line-delimited JSON-RPC; malformed frames get an error response
/// so the client never hangs waiting.
pub fn serve(mut server: QueryServer) -> io::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = BufReader::new(stdin.lock());
    let mut stdout = stdout.lock();

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        debug!(bytes = line.len(), "received frame");

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "unparseable request");
                write_response(
                    &mut stdout,
                    &JsonRpcResponse::error(None, JsonRpcError::parse_error()),
                )?;
                continue;
            }
        };

        if let Some(response) = server.handle_request(request) {
            write_response(&mut stdout, &response)?;
        }
    }
    Ok(())
}

fn write_response(out: &mut impl Write, response: &JsonRpcResponse) -> io::Result<()> {
    match serde_json::to_string(response) {
        Ok(frame) => {
            writeln!(out, "{frame}")?;
            out.flush()
        }
        Err(e) => {
            error!(error = %e, "response serialization failed");
            // Minimal fallback frame so the client does not hang.
            writeln!(
                out,
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":-32603,"message":"Internal error"}}}}"#
            )?;
            out.flush()
        }
    }
}
