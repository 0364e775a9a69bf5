// ==========================================
// 分组选题分配系统 - 引擎层
// ==========================================
// 职责: 分配规则、并发控制、队列排位
// 红线: Engine 不拼业务 SQL，数据访问经由 Repository
// ==========================================

pub mod allocator;
pub mod clock;
pub mod error;
pub mod events;
pub mod lock_table;
pub mod queue_reporter;

// 重导出核心引擎
pub use allocator::AllocationEngine;
pub use clock::CommitClock;
pub use error::{AllocationError, AllocationErrorKind, AllocationResult};
pub use events::{
    AllocationEvent, AllocationEventPublisher, AllocationEventType, NoOpEventPublisher,
    OptionalEventPublisher,
};
pub use lock_table::{LedgerKey, LedgerLockTable};
pub use queue_reporter::QueueReporter;
