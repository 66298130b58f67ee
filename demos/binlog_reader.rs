//! Reads framed records from stdin and prints each as a line of JSON.
//!
//! With no arguments the built in `binlog.BinLog` schema is used. Otherwise
//! pass the path of a JSON schema and the message type:
//!
//! ```sh
//! binlog_reader schemas/binlog.json binlog.BinLog < log.bin
//! ```

use futures::StreamExt;
use protoframe::{
    proto::binlog::{MESSAGE_TYPE, SCHEMA_JSON},
    Direction, SchemaRegistry, Transform, TransformConfig,
};
use tokio_util::codec::FramedRead;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let registry = SchemaRegistry::new();
    let mut args = std::env::args().skip(1);
    let (source, message_type) = match (args.next(), args.next()) {
        (Some(source), Some(message_type)) => (source, message_type),
        (None, _) => {
            registry.register_json("binlog.json", SCHEMA_JSON)?;
            ("binlog.json".to_string(), MESSAGE_TYPE.to_string())
        }
        (Some(_), None) => anyhow::bail!("usage: binlog_reader [<schema.json> <message type>]"),
    };

    let config = TransformConfig::new(Direction::Decode)
        .schema_source(source)
        .message_type(message_type);
    let decoder = Transform::from_config(config, &registry)?
        .into_decoder()
        .ok_or_else(|| anyhow::anyhow!("expected a decoder"))?;

    let mut records = FramedRead::new(tokio::io::stdin(), decoder);
    let mut count = 0;
    while let Some(record) = records.next().await {
        match record {
            Ok(record) => {
                println!("{}", record);
                count += 1;
            }
            Err(err) => {
                warn!("Stopping: {}", err);
                break;
            }
        }
    }
    info!("Read {} records", count);
    Ok(())
}
