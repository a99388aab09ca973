use fxhash::FxHashMap;

use super::dataset::WellCycleRecord;
use super::plate::WellPosition;
use super::window::DataWindow;

/// Flat baseline correction of the reporter channels inside the amplification window.
///
/// For every well the reporter values of its first cycle in the window are subtracted from all of
/// its cycles in the window, each reporter on its own. The passive reference is never touched and
/// records outside the window keep their raw values.
pub fn normalize_baseline(records: &mut [WellCycleRecord], window: &DataWindow) {
    let mut baselines: FxHashMap<WellPosition, (u32, f64, f64)> = FxHashMap::default();
    for record in records.iter().filter(|r| window.contains(r.cycle)) {
        let baseline = baselines
            .entry(record.well)
            .or_insert((record.cycle, record.reporter1, record.reporter2));
        if record.cycle < baseline.0 {
            *baseline = (record.cycle, record.reporter1, record.reporter2);
        }
    }

    for record in records.iter_mut().filter(|r| window.contains(r.cycle)) {
        if let Some((_, reporter1, reporter2)) = baselines.get(&record.well) {
            record.reporter1 -= reporter1;
            record.reporter2 -= reporter2;
        }
    }
    spdlog::debug!(
        "Baseline corrected {} wells over cycles {}-{}",
        baselines.len(),
        window.start_cycle,
        window.end_cycle
    );
}
