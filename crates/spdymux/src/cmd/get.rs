use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use spdymux_frame::{FrameConfig, Framer};
use spdymux_session::{Role, Session, SessionError, Stream};
use tracing::debug;

use crate::cmd::GetArgs;
use crate::exit::{
    frame_error, io_error, session_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR, USAGE,
};
use crate::output::{print_message, OutputFormat};

const READ_POLL: Duration = Duration::from_millis(250);

pub fn run(args: GetArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let extra_headers = parse_headers(&args.header)?;
    let addr = resolve(&args.addr)?;

    let socket =
        TcpStream::connect_timeout(&addr, timeout).map_err(|err| io_error("connect failed", err))?;
    let framer = Framer::from_tcp(
        socket,
        FrameConfig {
            read_timeout: Some(READ_POLL),
            write_timeout: Some(timeout),
            ..FrameConfig::default()
        },
    )
    .map_err(|err| frame_error("connection setup failed", err))?;
    let session = Session::builder(framer, Role::Client)
        .spawn()
        .map_err(|err| session_error("session start failed", err))?;

    let result = exchange(&session, &args, &extra_headers, timeout, format);
    session.close();
    result
}

fn exchange(
    session: &Session,
    args: &GetArgs,
    extra_headers: &[(String, String)],
    timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let stream = session
        .open_stream()
        .map_err(|err| session_error("open stream failed", err))?;
    send_request(&stream, args, extra_headers).map_err(|err| session_error("send failed", err))?;
    debug!(
        stream_id = stream.id(),
        frames_sent = stream.output().frames_sent(),
        "request sent"
    );

    loop {
        match stream.input().receive_timeout(timeout) {
            Ok(msg) => print_message(stream.id(), &msg, format),
            Err(SessionError::EndOfStream) => break,
            Err(err) => return Err(session_error("receive failed", err)),
        }
    }

    // a dead connection also ends every stream
    if session.is_closed() {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            "receive failed: connection lost before the response completed",
        ));
    }
    Ok(SUCCESS)
}

fn send_request(
    stream: &Stream,
    args: &GetArgs,
    extra_headers: &[(String, String)],
) -> spdymux_session::Result<()> {
    let output = stream.output();
    {
        let mut headers = output.headers();
        headers.set(":method", args.method.as_str());
        headers.set(":path", args.path.as_str());
        for (name, value) in extra_headers {
            headers.append(name, value.as_str());
        }
    }
    output.send_headers(false)?;

    if let Some(data) = &args.data {
        output.send(data.clone())?;
    }
    if args.lines {
        output.send_lines(io::stdin().lock())?;
    }
    output.close()
}

fn resolve(addr: &str) -> CliResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|err| CliError::new(USAGE, format!("invalid address {addr}: {err}")))?
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("address {addr} resolved to nothing")))
}

fn parse_headers(raw: &[String]) -> CliResult<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| {
            let (name, value) = entry.split_once('=').ok_or_else(|| {
                CliError::new(USAGE, format!("header must be NAME=VALUE: {entry}"))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CliError::new(USAGE, format!("header name is empty: {entry}")));
            }
            Ok((name.to_string(), value.to_string()))
        })
        .collect()
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
