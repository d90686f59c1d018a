use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spdymux_frame::{FrameConfig, FrameError, Framer};
use spdymux_session::{Role, Session, SessionConfig, SessionError, Stream};
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{frame_error, io_error, session_error, CliError, CliResult, SUCCESS};

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const READ_POLL: Duration = Duration::from_millis(500);

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let listener =
        TcpListener::bind(&args.addr).map_err(|err| io_error("bind failed", err))?;
    let local_addr = listener
        .local_addr()
        .map_err(|err| io_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| io_error("bind failed", err))?;
    info!(addr = %local_addr, "listening");
    if args.print_addr {
        println!("{local_addr}");
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut sessions: Vec<Session> = Vec::new();
    while running.load(Ordering::SeqCst) {
        let (socket, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error("accept failed", err)),
        };

        let session = start_session(socket, peer)?;
        if args.once {
            let outcome = session.join();
            log_outcome(peer, &outcome);
            return Ok(SUCCESS);
        }
        sessions.retain(|session| !session.is_closed());
        sessions.push(session);
    }

    info!(sessions = sessions.len(), "shutting down");
    for session in &sessions {
        session.close();
    }
    Ok(SUCCESS)
}

fn start_session(socket: TcpStream, peer: SocketAddr) -> CliResult<Session> {
    socket
        .set_nonblocking(false)
        .map_err(|err| io_error("accept failed", err))?;
    let framer = Framer::from_tcp(
        socket,
        FrameConfig {
            read_timeout: Some(READ_POLL),
            ..FrameConfig::default()
        },
    )
    .map_err(|err| frame_error("connection setup failed", err))?;

    info!(%peer, "connection accepted");
    Session::builder(framer, Role::Server)
        .handler(echo)
        .config(SessionConfig {
            thread_name_prefix: format!("spdymux-{}", peer.port()),
            ..SessionConfig::default()
        })
        .spawn()
        .map_err(|err| session_error("session start failed", err))
}

/// Reply with `:status: 200`, echo request headers and data, and forward
/// the peer's half-close.
fn echo(stream: Arc<Stream>) -> spdymux_session::Result<()> {
    stream.output().headers().set(":status", "200");
    let result = stream.input().pipe(stream.output());
    info!(
        stream_id = stream.id(),
        frames_sent = stream.output().frames_sent(),
        ok = result.is_ok(),
        "stream served"
    );
    result
}

fn log_outcome(peer: SocketAddr, outcome: &spdymux_session::Result<()>) {
    match outcome {
        Ok(()) | Err(SessionError::Transport(FrameError::ConnectionClosed)) => {
            info!(%peer, "connection closed");
        }
        Err(SessionError::Transport(FrameError::Io(err))) if is_disconnect(err) => {
            info!(%peer, error = %err, "connection dropped");
        }
        Err(err) => warn!(%peer, error = %err, "connection failed"),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}
