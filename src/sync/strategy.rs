//! Differential strategy selector.
//!
//! A record can be sent in full, as a diff against the previous live record,
//! or as a diff against the last sample the server acknowledged. Each
//! candidate is sized with the record codec and the one saving the most bytes
//! wins. A diff carries the id or timestamp of its reference in a marker
//! field (0 for live diffs, 1 for sample diffs) so the receiver knows what to
//! patch against.

use tracing::trace;

use crate::codec::{
    all_live_fields, all_sample_fields, calculate_encoded_size, common_live_sample_fields,
    encode_fields, live_table, sample_table, FieldKind, FieldMask, FieldSelection, FieldTable, Fields,
    SampleRecord, Value,
};
use crate::core::{
    Algorithm, CompressionStats, EncodeError, HardwareType, LIVE_DIFF_SEQUENCE_FIELD,
    LIVE_DIFF_SEQUENCE_FIELD_ID, SAMPLE_DIFF_TIMESTAMP_FIELD, SAMPLE_DIFF_TIMESTAMP_FIELD_ID,
};

/// A record's encoded field data and how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFields {
    /// Field data, `None` when the record was skipped.
    pub payload: Option<Vec<u8>>,
    /// Fields present in the payload.
    pub selection: FieldSelection,
    /// Size accounting.
    pub stats: CompressionStats,
}

/// One way of encoding a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Algorithm this candidate represents.
    pub algorithm: Algorithm,
    /// Fields it would send.
    pub selection: FieldSelection,
    /// Encoded size.
    pub size: usize,
    /// Bytes saved versus the full record; negative when the diff is larger.
    pub saving: isize,
}

/// Encoding candidates for a live record.
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// Full record.
    pub full: Candidate,
    /// Diff against the previous live record.
    pub live_diff: Option<Candidate>,
    /// Diff against the last acknowledged sample.
    pub sample_diff: Option<Candidate>,
    /// Nothing changed since the previous live record.
    pub skip: Option<Candidate>,
}

impl LiveOptions {
    /// The candidate saving the most bytes. Ties go to the earlier of full,
    /// live diff, sample diff and skip.
    pub fn best(&self) -> &Candidate {
        [&self.live_diff, &self.sample_diff, &self.skip]
            .into_iter()
            .flatten()
            .fold(&self.full, |best, c| if c.saving > best.saving { c } else { best })
    }
}

/// Fields of `target` whose values differ from `base`.
///
/// Ids in `ignore` are never included. Fields missing from either record are
/// skipped, there being nothing to compare. A subfield set is included (with
/// only the differing subfields) when any of its subfields differ.
pub fn build_field_id_list(
    base: &Fields,
    target: &Fields,
    table: &FieldTable,
    ignore: FieldMask,
) -> FieldSelection {
    let mut selection = FieldSelection::default();

    for def in table.definitions() {
        if ignore.contains(def.id) {
            continue;
        }
        let (Some(base_value), Some(target_value)) = (base.entry(def.name), target.entry(def.name))
        else {
            continue;
        };

        if let FieldKind::Subfields(sub_table) = def.kind {
            let empty = Fields::new();
            let base_sub = subfield_values(base_value.as_ref()).unwrap_or(&empty);
            let target_sub = subfield_values(target_value.as_ref()).unwrap_or(&empty);
            let changed = build_field_id_list(base_sub, target_sub, sub_table, FieldMask::EMPTY);
            if !changed.fields.is_empty() {
                selection.fields.insert(def.id);
                selection.subfields.insert(def.id, changed.fields);
            }
        } else if base_value != target_value {
            selection.fields.insert(def.id);
        }
    }

    selection
}

fn subfield_values(value: Option<&Value>) -> Option<&Fields> {
    match value {
        Some(Value::Subfields(fields)) => Some(fields),
        _ => None,
    }
}

/// Fields of a live record that differ from the previous live record.
pub fn diff_live_fields(previous: &Fields, live: &Fields, hardware: HardwareType) -> FieldSelection {
    let ignore = FieldMask::EMPTY
        .with(LIVE_DIFF_SEQUENCE_FIELD_ID)
        .with(SAMPLE_DIFF_TIMESTAMP_FIELD_ID);
    build_field_id_list(previous, live, live_table(hardware), ignore)
}

/// Fields of a sample record that differ from a previous sample.
pub fn diff_sample_fields(previous: &Fields, sample: &Fields, hardware: HardwareType) -> FieldSelection {
    let ignore = FieldMask::EMPTY.with(SAMPLE_DIFF_TIMESTAMP_FIELD_ID);
    build_field_id_list(previous, sample, sample_table(hardware), ignore)
}

/// Fields of a live record that must be sent given the server holds
/// `sample`.
///
/// Only fields with the same id in both tables can be diffed; every other
/// live field is always included. Subfields missing from either record are
/// always included.
pub fn diff_live_against_sample(sample: &Fields, live: &Fields, hardware: HardwareType) -> FieldSelection {
    let common = common_live_sample_fields(hardware).fields;
    let sample_defs = sample_table(hardware);
    let mut selection = FieldSelection::default();

    for def in live_table(hardware).definitions() {
        if def.id == LIVE_DIFF_SEQUENCE_FIELD_ID || def.id == SAMPLE_DIFF_TIMESTAMP_FIELD_ID {
            continue;
        }
        if sample_defs.by_name(def.name).is_none() || !common.contains(def.id) {
            selection.fields.insert(def.id);
            continue;
        }

        let base_value = sample.entry(def.name);
        let live_value = live.entry(def.name);

        if let FieldKind::Subfields(sub_table) = def.kind {
            let base_sub = base_value.and_then(|v| subfield_values(v.as_ref()));
            let live_sub = live_value.and_then(|v| subfield_values(v.as_ref()));
            let mut changed = FieldMask::EMPTY;
            for sub in sub_table.definitions() {
                let base_entry = base_sub.and_then(|f| f.entry(sub.name));
                let live_entry = live_sub.and_then(|f| f.entry(sub.name));
                match (base_entry, live_entry) {
                    (Some(b), Some(l)) if b == l => {}
                    _ => changed.insert(sub.id),
                }
            }
            if !changed.is_empty() {
                selection.fields.insert(def.id);
                selection.subfields.insert(def.id, changed);
            }
        } else if base_value != live_value {
            selection.fields.insert(def.id);
        }
    }

    selection
}

fn candidate(algorithm: Algorithm, selection: FieldSelection, table: &FieldTable, full_size: usize) -> Candidate {
    let size = calculate_encoded_size(table, &selection);
    Candidate {
        algorithm,
        selection,
        size,
        saving: full_size as isize - size as isize,
    }
}

/// Every way the live record could be encoded.
pub fn live_encoding_options(
    live: &Fields,
    previous_live: Option<&Fields>,
    previous_sample: Option<&Fields>,
    hardware: HardwareType,
) -> LiveOptions {
    let table = live_table(hardware);
    let full_selection = all_live_fields(hardware);
    let full_size = calculate_encoded_size(table, &full_selection);
    let full = Candidate {
        algorithm: Algorithm::None,
        selection: full_selection,
        size: full_size,
        saving: 0,
    };

    let mut skip = None;
    let live_diff = previous_live.map(|previous| {
        let mut selection = diff_live_fields(previous, live, hardware);
        if selection.is_empty() {
            skip = Some(Candidate {
                algorithm: Algorithm::Skip,
                selection: FieldSelection::default(),
                size: 0,
                saving: full_size as isize,
            });
        }
        selection.fields.insert(LIVE_DIFF_SEQUENCE_FIELD_ID);
        candidate(Algorithm::LiveDiff, selection, table, full_size)
    });

    let sample_diff = previous_sample.map(|sample| {
        let mut selection = diff_live_against_sample(sample, live, hardware);
        selection.fields.insert(SAMPLE_DIFF_TIMESTAMP_FIELD_ID);
        candidate(Algorithm::SampleDiff, selection, table, full_size)
    });

    LiveOptions { full, live_diff, sample_diff, skip }
}

/// Encode a live record, picking the smallest encoding.
///
/// `previous_live` is the last live record sent with its sequence id;
/// `previous_sample` the last sample known to be at the server. With
/// `compress` unset the full record is always sent. A skipped record has no
/// payload.
pub fn encode_live_record(
    live: &Fields,
    previous_live: Option<(&Fields, u16)>,
    previous_sample: Option<&SampleRecord>,
    hardware: HardwareType,
    compress: bool,
) -> Result<EncodedFields, EncodeError> {
    let options = live_encoding_options(
        live,
        previous_live.map(|(fields, _)| fields),
        previous_sample.map(|s| &s.fields),
        hardware,
    );
    let chosen = if compress { options.best() } else { &options.full };

    let stats = CompressionStats {
        full_size: options.full.size,
        saving: chosen.saving.max(0) as usize,
        algorithm: chosen.algorithm,
    };
    trace!(
        algorithm = %chosen.algorithm,
        full_size = stats.full_size,
        saving = stats.saving,
        "live encoding chosen"
    );

    if chosen.algorithm == Algorithm::Skip {
        return Ok(EncodedFields {
            payload: None,
            selection: chosen.selection.clone(),
            stats,
        });
    }

    let mut fields = live.clone();
    if let Some((_, sequence)) = previous_live {
        fields.set(LIVE_DIFF_SEQUENCE_FIELD, sequence);
    }
    if let Some(sample) = previous_sample {
        fields.set(SAMPLE_DIFF_TIMESTAMP_FIELD, sample.timestamp);
    }

    let payload = encode_fields(&fields, live_table(hardware), &chosen.selection)?;
    Ok(EncodedFields {
        payload: Some(payload),
        selection: chosen.selection.clone(),
        stats,
    })
}

/// Encoding candidates for a sample record: full, and a diff against the
/// previous sample when there is one.
pub fn sample_encoding_options(
    sample: &Fields,
    previous_sample: Option<&Fields>,
    hardware: HardwareType,
) -> (Candidate, Option<Candidate>) {
    let table = sample_table(hardware);
    let full_selection = all_sample_fields(hardware);
    let full_size = calculate_encoded_size(table, &full_selection);
    let full = Candidate {
        algorithm: Algorithm::None,
        selection: full_selection,
        size: full_size,
        saving: 0,
    };

    let diff = previous_sample.map(|previous| {
        let mut selection = diff_sample_fields(previous, sample, hardware);
        selection.fields.insert(SAMPLE_DIFF_TIMESTAMP_FIELD_ID);
        candidate(Algorithm::SampleDiff, selection, table, full_size)
    });

    (full, diff)
}

/// Encode a sample record, diffing against `previous_sample` only when that
/// saves at least one byte.
pub fn encode_sample_record(
    sample: &SampleRecord,
    previous_sample: Option<&SampleRecord>,
    hardware: HardwareType,
) -> Result<EncodedFields, EncodeError> {
    let (full, diff) = sample_encoding_options(
        &sample.fields,
        previous_sample.map(|s| &s.fields),
        hardware,
    );
    let chosen = match &diff {
        Some(diff) if diff.saving > 0 => diff,
        _ => &full,
    };

    let mut fields = sample.fields.clone();
    if let Some(previous) = previous_sample {
        fields.set(SAMPLE_DIFF_TIMESTAMP_FIELD, previous.timestamp);
    }

    let payload = encode_fields(&fields, sample_table(hardware), &chosen.selection)?;
    Ok(EncodedFields {
        payload: Some(payload),
        selection: chosen.selection.clone(),
        stats: CompressionStats {
            full_size: full.size,
            saving: chosen.saving.max(0) as usize,
            algorithm: chosen.algorithm,
        },
    })
}
