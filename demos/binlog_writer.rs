//! Writes framed `binlog.BinLog` records to stdout.
//!
//! ```sh
//! cargo run --bin binlog_writer -- 5 | cargo run --bin binlog_reader
//! ```

use chrono::Utc;
use futures::SinkExt;
use protoframe::{
    proto::binlog::{MESSAGE_TYPE, SCHEMA_JSON},
    Direction, SchemaRegistry, Transform, TransformConfig,
};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde_json::json;
use tokio_util::codec::FramedWrite;
use tracing::info;

const KINDS: [&str; 3] = ["PUT", "DELETE", "TOUCH"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the records
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let count: usize = match std::env::args().nth(1) {
        Some(count) => count.parse()?,
        None => 10,
    };

    let registry = SchemaRegistry::new();
    registry.register_json("binlog.json", SCHEMA_JSON)?;
    let config = TransformConfig::new(Direction::Encode)
        .schema_source("binlog.json")
        .message_type(MESSAGE_TYPE);
    let encoder = Transform::from_config(config, &registry)?
        .into_encoder()
        .ok_or_else(|| anyhow::anyhow!("expected an encoder"))?;

    let mut sink = FramedWrite::new(tokio::io::stdout(), encoder);
    let mut rng = thread_rng();
    for i in 0..count {
        let key: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let data: Vec<u8> = (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect();
        let record = json!({
            "type": KINDS[i % KINDS.len()],
            "key": key,
            "timestamp": Utc::now().timestamp_millis(),
            "data": data,
        });
        sink.send(record).await?;
    }
    sink.close().await?;
    info!("Wrote {} records", count);
    Ok(())
}
