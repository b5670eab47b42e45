//! Race pacing plans: split a course into a fixed number of constant-pace
//! legs that stay as close as possible to grade-adjusted effort while
//! finishing exactly on the target time.

pub mod backtrack;
pub mod batch;
pub mod config;
pub mod course;
pub mod engine;
pub mod error;
pub mod export;
pub mod gpx_course;
pub mod layers;
pub mod pace_model;
pub mod pace_table;
pub mod partition;
pub mod segmenting;
pub mod units;

pub use backtrack::PacingPlan;
pub use batch::{run_batch, BatchConfig, BatchResult, TargetTime};
pub use config::{CourseConfig, LossMetric, PlannerConfig, SmoothingMethod, Strategy};
pub use course::{CourseProfile, TrackPoint};
pub use engine::{plan_course, PacingEngine};
pub use error::{PacingError, Result};
pub use gpx_course::load_gpx_course;
pub use pace_model::OptimalPaceModel;
pub use pace_table::WeightedPaceTable;
pub use partition::PartitionTable;
pub use units::DistanceUnit;
