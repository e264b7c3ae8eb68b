//! 各实体的状态枚举
//!
//! 状态以整数状态码持久化，`from_code` 对未知状态码返回错误。

use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident = $code:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn code(self) -> i64 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            pub fn from_code(code: i64) -> SchedulerResult<Self> {
                match code {
                    $($code => Ok($name::$variant),)+
                    _ => Err(SchedulerError::UnknownStatusCode { kind: $kind, code }),
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let code = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                $name::from_code(code).map_err(|e| Box::new(e) as sqlx::error::BoxDynError)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                <i64 as sqlx::Encode<sqlx::Sqlite>>::encode(self.code(), buf)
            }
        }
    };
}

status_enum! {
    /// 任务状态
    TaskStatus, "任务" {
        Open = 0 => "OPEN",
        Completed = 1 => "COMPLETED",
        Created = 2 => "CREATED",
        Canceled = 101 => "CANCELED",
        Failed = 102 => "FAILED",
    }
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Canceled | TaskStatus::Failed
        )
    }
}

status_enum! {
    /// 迭代状态
    IterationStatus, "迭代" {
        Collecting = 0 => "COLLECTING",
        Aggregating = 1 => "AGGREGATING",
        Applying = 4 => "APPLYING",
        Completed = 50 => "COMPLETED",
        PostProcessed = 51 => "POST_PROCESSED",
        Stopped = 100 => "STOPPED",
        Canceled = 101 => "CANCELED",
        AggregatingFailed = 102 => "AGGREGATING_FAILED",
        ApplyingFailed = 103 => "APPLYING_FAILED",
    }
}

/// 活跃分配的最大状态码，`<=` 此值的分配占用迭代容量
pub const MAX_ACTIVE_ASSIGNMENT_STATUS_CODE: i64 = 99;

status_enum! {
    /// 设备分配状态
    AssignmentStatus, "分配" {
        Assigned = 0 => "ASSIGNED",
        LocalCompleted = 1 => "LOCAL_COMPLETED",
        UploadCompleted = 2 => "UPLOAD_COMPLETED",
        Canceled = 101 => "CANCELED",
        LocalFailed = 102 => "LOCAL_FAILED",
        LocalNotEligible = 103 => "LOCAL_NOT_ELIGIBLE",
        RemoteFailed = 104 => "REMOTE_FAILED",
        LocalFailedExampleGeneration = 105 => "LOCAL_FAILED_EXAMPLE_GENERATION",
        LocalFailedModelComputation = 106 => "LOCAL_FAILED_MODEL_COMPUTATION",
        LocalFailedOpsError = 107 => "LOCAL_FAILED_OPS_ERROR",
        LocalTimeout = 151 => "LOCAL_TIMEOUT",
        UploadTimeout = 152 => "UPLOAD_TIMEOUT",
    }
}

impl AssignmentStatus {
    pub fn is_active(self) -> bool {
        self.code() <= MAX_ACTIVE_ASSIGNMENT_STATUS_CODE
    }
}

status_enum! {
    /// 聚合批次状态
    AggregationBatchStatus, "聚合批次" {
        Full = 1 => "FULL",
        PublishCompleted = 2 => "PUBLISH_COMPLETED",
        UploadCompleted = 3 => "UPLOAD_COMPLETED",
        Failed = 101 => "FAILED",
    }
}

status_enum! {
    /// 设备签到结果，状态码越小越优先
    CheckInResult, "签到结果" {
        Success = 1 => "SUCCESS",
        IterationFull = 101 => "ITERATION_FULL",
        IterationNotOpen = 110 => "ITERATION_NOT_OPEN",
        ClientVersionMismatch = 120 => "CLIENT_VERSION_MISMATCH",
        IterationNotActive = 130 => "ITERATION_NOT_ACTIVE",
    }
}
