pub mod baseline;
pub mod compositor;
pub mod diagnostics;
pub mod monthly_aggregator;
pub mod parallel_processor;
pub mod quality_mask;
pub mod series_assembler;

pub use baseline::{condition_index, BaselineBuilder, BaselineExtent, BaselineStatistics};
pub use compositor::{
    apply_regional_index, prepare_composite, select_window, temporal_mean, window_bounds,
    CompositeOutcome, PreparedImage, TemporalCompositor,
};
pub use diagnostics::{missing_months, RunDiagnostics};
pub use monthly_aggregator::{Aggregation, MonthlyAggregator};
pub use parallel_processor::{ParallelProcessor, StationOutput, StationPipeline};
pub use quality_mask::{FlagTally, MaskDecision, MaskOutcome, QualityMaskEvaluator};
pub use series_assembler::SeriesAssembler;
