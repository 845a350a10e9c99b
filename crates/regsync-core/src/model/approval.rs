//! Approval metadata carried by every synchronized node.

/// The only status a synchronized node may carry.
pub const APPROVED: &str = "APPROVED";

pub const APPROVAL_STATUS: &str = "approvalStatus";
pub const APPROVED_BY: &str = "approvedBy";
pub const APPROVED_AT: &str = "approvedAt";
pub const CONFIG_VERSION: &str = "configVersion";
pub const SYNCED_AT: &str = "syncedAt";
pub const UPDATED_AT: &str = "updatedAt";
pub const LAST_SYNCED_AT: &str = "lastSyncedAt";

/// Fields whose absence on a node is an integrity violation.
pub const MANDATORY_FIELDS: [&str; 3] = [APPROVAL_STATUS, APPROVED_BY, APPROVED_AT];

/// Fields that are set once, on create, and never overwritten.
pub const WRITE_ONCE_FIELDS: [&str; 5] =
    [APPROVAL_STATUS, APPROVED_BY, APPROVED_AT, CONFIG_VERSION, SYNCED_AT];
