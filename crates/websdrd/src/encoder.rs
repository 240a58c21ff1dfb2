//! Composes the outbound state update for one writable turn.

use websdr_core::Demod;
use websdr_protocol::{CurrentSource, StateUpdate};

use crate::hardware::{HardwareSnapshot, SourceTable};
use crate::registry::Session;

/// Builds the next update for `session` and commits it as sent.
///
/// The first update after connect carries the init bundle. Later updates
/// carry live hardware values unless a full source bundle supersedes them.
/// Dirty flags are snapshotted before composing and only those observed set
/// are cleared afterwards.
pub fn compose(session: &mut Session, sources: &SourceTable, num_clients: usize) -> StateUpdate {
    let dirty = session.dirty;
    let receiver = &session.receiver;
    let attached = receiver.source_ix().and_then(|ix| sources.get(ix));
    let mut update = StateUpdate::new(num_clients);

    if !session.initialized {
        update.stream_name = Some(session.id.stream_name());
        update.sources = Some(sources.labels());
        update.supported_demods = Some(Demod::supported_names());
    } else if !dirty.source {
        if let Some(entry) = attached {
            let hw = HardwareSnapshot::read(entry.driver.as_ref());
            update.hw_freq = Some(hw.center_freq);
            update.gain = Some(hw.gain);
            update.auto_gain = Some(hw.auto_gain);
        }
    }

    if dirty.privileged {
        update.privileged = Some(receiver.privileged());
    }
    if dirty.demod {
        update.demod = Some(receiver.demod());
    }
    if dirty.offset {
        update.freq_offset = Some(receiver.freq_offset());
    }
    if dirty.source {
        update.current_source = attached.map(|entry| {
            let hw = HardwareSnapshot::read(entry.driver.as_ref());
            CurrentSource {
                source_ix: entry.descriptor.index,
                description: entry.descriptor.description.clone(),
                hw_freq: hw.center_freq,
                sample_rate: hw.sample_rate,
                converter_offset: entry.descriptor.converter_offset,
                auto_gain: hw.auto_gain,
                gain: hw.gain,
            }
        });
    }

    session.initialized = true;
    session.dirty.clear(dirty);
    update
}
