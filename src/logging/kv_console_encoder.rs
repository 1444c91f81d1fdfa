//! The `kv_console` encoder behind the default stderr appender.
//!
//! Client logs carry their request context as key/values rather than in the
//! message: `operation`, `request_id`, `retry` and `delay_ms` on the retry
//! path, `table` and `rows` on audited writes. They are appended after the
//! pattern-formatted line as `key=value`, so a retry warning reads
//!
//! ```text
//! 2026-10-19 10:00:00.000 WARN  ots_client::client Request failed, retrying operation=GetRow retry=1 delay_ms=412 error="service error on GetRow, HTTP status: 503, ErrorCode: OTSServerBusy, ErrorMessage: Server is busy."
//! ```
//!
//! Error strings contain spaces, so any value with whitespace (or an empty
//! value) is written quoted and a line can still be split on `key=`.

use std::io;

use log::Record;
use log::kv::{Error, Key, Value, VisitSource};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::encode::{Color, Encode, Style, Write};
use serde::Deserialize;

const DEFAULT_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:<5})} {t} {m}";

/// YAML body of a `kind: kv_console` encoder.
#[derive(Debug, Default, Deserialize)]
pub struct KvConsoleEncoderConfig {
    /// log4rs pattern for the part before the key/values.
    pub pattern: Option<String>,
    /// Colour the `key=` prefixes cyan on styled writers. Defaults to true.
    pub colored_keys: Option<bool>,
}

#[derive(Debug)]
pub struct KvConsoleEncoder {
    line: PatternEncoder,
    colored_keys: bool,
}

impl KvConsoleEncoder {
    pub fn new(pattern: &str, colored_keys: bool) -> Self {
        Self {
            line: PatternEncoder::new(pattern),
            colored_keys,
        }
    }
}

impl Encode for KvConsoleEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> anyhow::Result<()> {
        self.line.encode(w, record)?;

        let mut visitor = KvWriter {
            writer: w,
            colored_keys: self.colored_keys,
            io_err: None,
        };

        if let Err(kv_err) = record.key_values().visit(&mut visitor) {
            if let Some(io_err) = visitor.io_err {
                return Err(io_err.into());
            }
            write!(w, " [kv error: {}]", kv_err)?;
        }

        w.write_all(b"\n")?;
        Ok(())
    }
}

fn quote_if_needed(value: &str) -> String {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        format!("{:?}", value)
    } else {
        value.to_string()
    }
}

struct KvWriter<'a> {
    writer: &'a mut dyn Write,
    colored_keys: bool,
    io_err: Option<io::Error>,
}

impl KvWriter<'_> {
    fn write_pair(&mut self, key: &Key<'_>, value: &Value<'_>) -> io::Result<()> {
        if self.colored_keys {
            self.writer.set_style(Style::new().text(Color::Cyan))?;
        }
        write!(self.writer, " {}=", key)?;
        if self.colored_keys {
            self.writer.set_style(&Style::default())?;
        }
        write!(self.writer, "{}", quote_if_needed(&value.to_string()))
    }
}

impl<'kvs> VisitSource<'kvs> for KvWriter<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), Error> {
        if let Err(e) = self.write_pair(&key, &value) {
            self.io_err = Some(e);
            return Err(Error::msg("io error while writing key/value pair"));
        }
        Ok(())
    }
}

pub struct KvConsoleEncoderDeserializer;

impl log4rs::config::Deserialize for KvConsoleEncoderDeserializer {
    type Trait = dyn Encode;
    type Config = KvConsoleEncoderConfig;

    fn deserialize(
        &self,
        config: KvConsoleEncoderConfig,
        _: &log4rs::config::Deserializers,
    ) -> anyhow::Result<Box<dyn Encode>> {
        let pattern = config.pattern.as_deref().unwrap_or(DEFAULT_PATTERN);
        Ok(Box::new(KvConsoleEncoder::new(pattern, config.colored_keys.unwrap_or(true))))
    }
}
