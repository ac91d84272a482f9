use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use data::config::Config;
use data::session::{Params, SaslPlain, Session};
use irc::{Codec, Connection};

use crate::event::{AppEvent, Payload};
use crate::format;

/// Wait between failed connection attempts.
const CONNECT_RETRY: Duration = Duration::from_secs(60);
/// Wait before reconnecting after a lost connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(10);
/// Outbound message queue drained by the writer task.
const OUTBOUND_QUEUE: usize = 64;

/// Spawns the network task for one session: connect, hand the session
/// over, pump messages, reconnect on loss. `net_id` is empty for the
/// control connection and a bouncer network id otherwise.
pub fn spawn(
    net_id: String,
    config: Arc<Config>,
    events: mpsc::Sender<AppEvent>,
    shutdown: Arc<AtomicBool>,
) {
    tokio::spawn(run(net_id, config, events, shutdown));
}

async fn run(
    net_id: String,
    config: Arc<Config>,
    events: mpsc::Sender<AppEvent>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let Some(connection) = connect(&net_id, &config, &events, &shutdown).await else {
            return;
        };

        let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let session = Session::new(params(&net_id, &config), outbound_tx);

        if events
            .send(AppEvent::from_net(
                &net_id,
                Payload::Session(Box::new(session)),
            ))
            .await
            .is_err()
        {
            return;
        }

        let (mut sink, mut source) = connection.split();

        let writer = {
            let events = events.clone();
            let net_id = net_id.clone();
            let debug = config.debug;

            tokio::spawn(async move {
                while let Some(message) = outbound_rx.recv().await {
                    if debug {
                        let line = irc::proto::format::message(message.clone())
                            .trim_end()
                            .to_string();
                        let _ = events
                            .send(AppEvent::from_net(
                                &net_id,
                                Payload::Raw {
                                    line,
                                    outgoing: true,
                                },
                            ))
                            .await;
                    }
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
            })
        };

        while let Some(item) = source.next().await {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            match item {
                Ok(Ok(message)) => {
                    if config.debug {
                        let line = irc::proto::format::message(message.clone())
                            .trim_end()
                            .to_string();
                        let _ = events
                            .send(AppEvent::from_net(
                                &net_id,
                                Payload::Raw {
                                    line,
                                    outgoing: false,
                                },
                            ))
                            .await;
                    }
                    if events
                        .send(AppEvent::from_net(&net_id, Payload::Message(message)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                // Malformed lines are skipped, not fatal
                Ok(Err(e)) => log::debug!("skipping malformed line: {e}"),
                Err(e) => {
                    log::warn!("read error: {e}");
                    break;
                }
            }
        }

        writer.abort();

        let _ = events
            .send(AppEvent::from_net(&net_id, Payload::Closed))
            .await;
        status(&events, &net_id, format::error_line("Connection lost")).await;

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect(
    net_id: &str,
    config: &Config,
    events: &mpsc::Sender<AppEvent>,
    shutdown: &AtomicBool,
) -> Option<Connection<Codec>> {
    let (host, port) = config.host_port();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return None;
        }

        status(
            events,
            net_id,
            format::status_line(format!("Connecting to {host}:{port}...")),
        )
        .await;

        let security = if config.tls {
            irc::connection::Security::Secured {
                accept_invalid_certs: config.accept_invalid_certs,
                root_cert_path: None,
                client_cert_path: None,
                client_key_path: None,
            }
        } else {
            irc::connection::Security::Unsecured
        };

        match Connection::new(
            irc::connection::Config {
                server: host,
                port,
                security,
            },
            Codec,
        )
        .await
        {
            Ok(connection) => return Some(connection),
            Err(e) => {
                status(
                    events,
                    net_id,
                    format::error_line(format!("Connection failed: {e}")),
                )
                .await;
                time::sleep(CONNECT_RETRY).await;
            }
        }
    }
}

fn params(net_id: &str, config: &Config) -> Params {
    Params {
        nickname: config.nickname.clone(),
        username: config.username().to_string(),
        realname: config.realname().to_string(),
        auth: config.password.as_ref().map(|password| SaslPlain {
            username: config.username().to_string(),
            password: password.clone(),
        }),
        net_id: net_id.to_string(),
    }
}

async fn status(events: &mpsc::Sender<AppEvent>, net_id: &str, line: data::Line) {
    let _ = events
        .send(AppEvent::from_net(net_id, Payload::Status(line)))
        .await;
}
