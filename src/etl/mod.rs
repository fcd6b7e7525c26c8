pub mod activity;
pub mod detector;
pub mod engine_db;
pub mod extractor;
pub mod grouping;
pub mod identification;
pub mod maintenance;
pub mod model;
pub mod orchestrator;
pub mod publisher;
pub mod scoring;

pub use activity::ActivityAggregator;
pub use detector::ContractDetector;
pub use engine_db::{EngineDb, EngineStats};
pub use extractor::{BlockRange, ChainDataClient, HyperSyncClient, SampleChain};
pub use grouping::ApplicationGrouper;
pub use identification::{CategoryClassifier, TypeClassifier};
pub use maintenance::{spawn_maintenance, Maintenance, MaintenanceConfig};
pub use orchestrator::{DiscoveryOrchestrator, OrchestratorConfig};
pub use publisher::{EventName, ProgressPublisher, ScanEvent};
pub use scoring::QualityScorer;
