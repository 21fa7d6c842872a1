//! Column widths of the case artifact tables
//!
//! Shared by the schema and by record validation so that nothing that
//! passed validation can be refused by the database.

pub const CASE_ID: usize = 64;
pub const RECORD_ID: usize = 64;
pub const MODEL_NAME: usize = 128;

pub const INDICATOR: usize = 512;
pub const INDICATOR_TYPE: usize = 64;
pub const FULL_PATH: usize = 1024;
pub const SHA256: usize = 64;
pub const SHA1: usize = 40;
pub const MD5: usize = 32;
pub const TYPE_PURPOSE: usize = 128;
pub const SOURCE: usize = 128;
pub const SUBMITTED_BY: usize = 128;
pub const INITIAL_LEAD: usize = 512;
pub const ATTACK_ALIGNMENT: usize = 128;

pub const TIMESTAMP_TYPE: usize = 64;
pub const STATUS_TAG: usize = 64;
pub const SYSTEM_NAME: usize = 256;
pub const ACTIVITY: usize = 512;
pub const EVIDENCE_SOURCE: usize = 256;
pub const HASH: usize = 128;
