//! 配送派单引擎
//!
//! 订单可以取货后依次推送给附近空闲的骑手，第一个接单的骑手获得订单。
//! 超时无人接单时重试，多轮失败后转入等待骑手状态，由恢复扫描重新入队。

pub mod arbitration;
pub mod broadcaster;
pub mod candidate_selector;
pub mod dispatch_loop;
pub mod engine;
pub mod recovery_service;
pub mod rejection_tracker;
pub mod sequencer;
pub mod state_machine;

pub use arbitration::AcceptOutcome;
pub use candidate_selector::{
    strategy_for, NearestFirstStrategy, SelectionStrategy, StableOrderStrategy,
};
pub use engine::{DispatchDependencies, DispatchEngine};
pub use recovery_service::{OrderRecoveryService, RecoveryReport, RecoveryService};
pub use rejection_tracker::RejectOutcome;
pub use sequencer::SubmitOutcome;
pub use state_machine::{AttemptDecision, AttemptEnd};
