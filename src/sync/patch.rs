//! Record patching, the receiving side of differential encoding.
//!
//! A diffed record only carries the fields that changed. Patching fills in
//! the rest from the reference record the diff was taken against.

use tracing::warn;

use crate::codec::{
    all_live_fields, all_sample_fields, common_live_sample_fields, live_table, sample_table,
    FieldKind, FieldMask, FieldTable, Fields,
};
use crate::core::HardwareType;

/// Fill fields of `record` not in `existing` from `base`.
///
/// Only ids in `all` are considered missing. A subfield set that is present
/// in `record` has its missing subfields copied individually; one that is
/// absent is copied whole.
pub fn patch_record(
    record: &Fields,
    base: &Fields,
    existing: FieldMask,
    all: FieldMask,
    table: &FieldTable,
) -> Fields {
    let missing = all.difference(existing);
    let mut patched = record.clone();

    for def in table.definitions() {
        let is_subfield_set = matches!(def.kind, FieldKind::Subfields(_));
        if !missing.contains(def.id) && !is_subfield_set {
            continue;
        }

        match (def.kind, patched.subfields_mut(def.name)) {
            (FieldKind::Subfields(sub_table), Some(values)) => {
                let base_values = base.subfields(def.name);
                for sub in sub_table.definitions() {
                    if values.contains(sub.name) {
                        continue;
                    }
                    match base_values.and_then(|b| b.entry(sub.name)) {
                        Some(value) => values.insert(sub.name, value.clone()),
                        None => warn!(
                            field = def.name,
                            subfield = sub.name,
                            "subfield missing from both the record and its base"
                        ),
                    }
                }
            }
            _ => {
                if let Some(value) = base.entry(def.name) {
                    patched.insert(def.name, value.clone());
                }
            }
        }
    }

    patched
}

/// Patch a live record diffed against the previous live record.
pub fn patch_live_from_live(
    live: &Fields,
    base: &Fields,
    existing: FieldMask,
    hardware: HardwareType,
) -> Fields {
    patch_record(live, base, existing, all_live_fields(hardware).fields, live_table(hardware))
}

/// Patch a live record diffed against a sample record. Only the fields the
/// two tables share can come from the sample.
pub fn patch_live_from_sample(
    live: &Fields,
    base: &Fields,
    existing: FieldMask,
    hardware: HardwareType,
) -> Fields {
    patch_record(
        live,
        base,
        existing,
        common_live_sample_fields(hardware).fields,
        sample_table(hardware),
    )
}

/// Patch a sample record diffed against a previous sample.
pub fn patch_sample(
    sample: &Fields,
    base: &Fields,
    existing: FieldMask,
    hardware: HardwareType,
) -> Fields {
    patch_record(sample, base, existing, all_sample_fields(hardware).fields, sample_table(hardware))
}
