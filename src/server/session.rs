//! Per-connection command handling
//!
//! Commands arrive one per line. `SUBSCRIBE` upgrades the connection into
//! a long-lived session: the server writes one value, the client answers
//! with `ACK`, `NACK`, `BACK`, or `DACK <seconds>`, the server replies
//! `OK` and moves on. Malformed commands, wrong argument counts, and
//! unknown ack verbs get an `ERR` reply and end the session; a
//! `NoInFlight` error is reported but the session continues.

use crate::broker::Broker;
use crate::consumer::Consumer;
use crate::error::{QueueError, Result};
use crate::types::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub(crate) async fn handle(stream: TcpStream, broker: Arc<Broker>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let input = line.trim_end_matches(['\r', '\n']);
        if input.is_empty() {
            continue;
        }

        let (verb, rest) = match input.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (input, None),
        };

        match verb.to_ascii_lowercase().as_str() {
            "info" => {
                let info = broker.info().await?;
                reply(
                    &mut writer,
                    &format!(
                        "miniqueue_{} topics={} messages={} consumers={}",
                        env!("CARGO_PKG_VERSION"),
                        info.store.topics,
                        info.store.messages,
                        info.consumers,
                    ),
                )
                .await?;
            }

            "ping" => reply(&mut writer, "pong").await?,

            "topics" => {
                let topics = broker.topics().await?;
                reply(&mut writer, &serde_json::to_string(&topics)?).await?;
            }

            "publish" => {
                let Some((topic, payload)) = rest.and_then(|r| r.split_once(' ')) else {
                    reply(&mut writer, "ERR invalid number of args, want: 3").await?;
                    return Ok(());
                };
                match broker
                    .publish(topic, Value::from(payload.as_bytes().to_vec()))
                    .await
                {
                    Ok(_) => reply(&mut writer, "OK").await?,
                    Err(e) => {
                        tracing::error!(topic, error = %e, "failed to publish");
                        reply(&mut writer, "ERR failed to publish").await?;
                        return Err(e);
                    }
                }
            }

            "subscribe" => {
                let Some(topic) = rest.filter(|r| !r.contains(' ')) else {
                    reply(&mut writer, "ERR invalid number of args, want: 2").await?;
                    return Ok(());
                };
                return subscribe(broker, topic, reader, writer).await;
            }

            other => {
                reply(&mut writer, &format!("ERR unknown command '{}'", other)).await?;
                return Ok(());
            }
        }
    }
}

/// Run a subscribe session to completion, always unsubscribing on exit
async fn subscribe(
    broker: Arc<Broker>,
    topic: &str,
    reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
) -> Result<()> {
    let consumer = match broker.subscribe(topic).await {
        Ok(consumer) => consumer,
        Err(e) => {
            reply(&mut writer, &format!("ERR {}", e)).await?;
            return Err(e);
        }
    };

    tracing::debug!(consumer = %consumer.id(), topic, "subscribe session started");

    let result = session_loop(&consumer, reader, &mut writer).await;

    if let Err(e) = broker.unsubscribe(topic, consumer.id()).await {
        tracing::error!(consumer = %consumer.id(), error = %e, "failed to unsubscribe");
    }
    tracing::debug!(consumer = %consumer.id(), topic, "subscribe session closed");
    result
}

async fn session_loop(
    consumer: &Arc<Consumer>,
    mut reader: BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Result<()> {
    let mut line = String::new();

    loop {
        let value = match consumer.next().await {
            Ok(value) => value,
            Err(QueueError::Cancelled) => return Ok(()),
            Err(e) => {
                tracing::error!(consumer = %consumer.id(), error = %e, "getting next value");
                reply(writer, "ERR failed to get next value").await?;
                return Err(e);
            }
        };

        writer.write_all(&value.raw).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            // client went away; the in-flight value redelivers later
            return Ok(());
        }
        let parts: Vec<&str> = line.split_whitespace().collect();

        let resolved = match parts
            .first()
            .map(|verb| verb.to_ascii_uppercase())
            .as_deref()
        {
            Some("ACK") if parts.len() == 1 => consumer.ack().await,
            Some("NACK") if parts.len() == 1 => consumer.nack().await,
            Some("BACK") if parts.len() == 1 => consumer.back().await,
            Some("DACK") if parts.len() == 2 => match parts[1].parse::<u64>() {
                Ok(seconds) => consumer.dack(Duration::from_secs(seconds)).await,
                Err(_) => {
                    reply(writer, "ERR invalid delay").await?;
                    return Ok(());
                }
            },
            _ => {
                reply(writer, "ERR invalid ack command").await?;
                return Ok(());
            }
        };

        match resolved {
            Ok(()) => reply(writer, "OK").await?,
            Err(QueueError::NoInFlight) => {
                reply(writer, "ERR no value in flight").await?;
            }
            Err(e) => {
                tracing::error!(consumer = %consumer.id(), error = %e, "resolving ack");
                reply(writer, "ERR failed to resolve").await?;
                return Err(e);
            }
        }
    }
}

async fn reply(writer: &mut OwnedWriteHalf, message: &str) -> Result<()> {
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
