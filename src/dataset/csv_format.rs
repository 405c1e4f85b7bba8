use super::Sample;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::io;
use std::str::FromStr;

/// Header written on export. On import the first line is skipped unread.
pub const HEADER: [&str; 3] = ["input1", "input2", "output"];
const NUM_FIELDS: usize = 3;

/// Parse field `idx` of a record, None if it is missing or malformed
fn parse_field<T: FromStr>(record: &StringRecord, idx: usize) -> Option<T> {
    record.get(idx).and_then(|x| T::from_str(x).ok())
}

/// Turn a record of the form <input1>,<input2>,<output>[,...] into a Sample.
/// Fields past the third are ignored.
fn parse_record(record: &StringRecord) -> Option<Sample> {
    if record.len() < NUM_FIELDS {
        return None;
    }

    let input1 = parse_field(record, 0)?;
    let input2 = parse_field(record, 1)?;
    let output = parse_field(record, 2)?;

    Sample::new(input1, input2, output).ok()
}

/// Parse CSV text into samples.
/// Returns the samples that parsed and the number of rows that did not.
/// Fields are split on a literal comma; quotes carry no meaning.
pub fn parse_samples(text: &str) -> (Vec<Sample>, usize) {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let mut samples = vec![];
    let mut skipped = 0;

    for result in reader.records() {
        match result.ok().as_ref().and_then(parse_record) {
            Some(sample) => samples.push(sample),
            None => {
                skipped += 1;
                tracing::warn!("Skipping malformed CSV row {}", samples.len() + skipped);
            }
        }
    }

    (samples, skipped)
}

/// Render samples as `input1,input2,output` CSV, one newline-terminated row each
pub fn format_samples(samples: &[Sample]) -> csv::Result<String> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(vec![]);

    writer.write_record(HEADER)?;
    for sample in samples {
        writer.serialize(sample)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;

    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}
