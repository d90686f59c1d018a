//! Two sessions over a loopback TCP connection: the server echoes every
//! stream, the client opens a few streams concurrently and prints replies.
//!
//! Run with:
//!   cargo run --example echo-session

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spdymux::frame::{FrameConfig, Framer};
use spdymux::session::{Role, Session, SessionError, Stream};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    eprintln!("Listening on {addr}");

    let server = thread::spawn(move || -> Result<(), SessionError> {
        let (socket, _) = listener.accept()?;
        let framer = Framer::from_tcp(socket, FrameConfig::default())?;
        let session = Session::builder(framer, Role::Server)
            .handler(|stream: Arc<Stream>| {
                stream.output().headers().set(":status", "200");
                stream.input().pipe(stream.output())
            })
            .build();
        session.run()
    });

    let config = FrameConfig {
        read_timeout: Some(Duration::from_millis(200)),
        ..FrameConfig::default()
    };
    let framer = Framer::from_tcp(TcpStream::connect(addr)?, config)?;
    let client = Session::builder(framer, Role::Client).spawn()?;

    let workers: Vec<_> = (0..3)
        .map(|n| {
            let client = client.clone();
            thread::spawn(move || -> Result<(), SessionError> {
                let stream = client.open_stream()?;
                stream.output().headers().set(":path", format!("/demo/{n}"));
                stream.output().send(format!("hello from request {n}"))?;
                stream.output().close()?;

                let status = stream.input().wait_for_header(":status")?;
                loop {
                    match stream.input().receive() {
                        Ok(msg) => {
                            if let Some(data) = msg.data {
                                eprintln!(
                                    "stream {} ({status}): {}",
                                    stream.id(),
                                    String::from_utf8_lossy(&data)
                                );
                            }
                        }
                        Err(SessionError::EndOfStream) => return Ok(()),
                        Err(err) => return Err(err),
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        if let Ok(Err(err)) = worker.join() {
            eprintln!("request failed: {err}");
        }
    }

    // The client's pump notices the close on its next read timeout and
    // drops the connection, which ends the server's pump.
    client.close();
    client.join()?;
    drop(client);
    match server.join() {
        Ok(Err(err)) => eprintln!("Server stopped: {err}"),
        _ => eprintln!("Server stopped"),
    }
    Ok(())
}
