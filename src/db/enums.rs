use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "task_type_enum")]
pub enum TaskType {
    #[sea_orm(string_value = "DownloadPackage")]
    DownloadPackage,
    #[sea_orm(string_value = "Install")]
    Install,
    #[sea_orm(string_value = "RetrieveLog")]
    RetrieveLog,
    #[sea_orm(string_value = "Reboot")]
    Reboot,
    #[sea_orm(string_value = "SelfTest")]
    SelfTest,
    #[sea_orm(string_value = "Reset")]
    Reset,
}

impl TaskType {
    /// Deployment-class tasks carry package associations and require a name.
    pub fn is_deployment(self) -> bool {
        matches!(self, TaskType::DownloadPackage | TaskType::Install)
    }

    /// Only Reboot and SelfTest report outcomes for nested sub-assets.
    pub fn has_sub_device_results(self) -> bool {
        matches!(self, TaskType::Reboot | TaskType::SelfTest)
    }

    pub fn has_log_results(self) -> bool {
        self == TaskType::RetrieveLog
    }

    /// Path the external scheduler calls back into to start execution.
    pub fn callback_path(self) -> &'static str {
        match self {
            TaskType::DownloadPackage => "/executions/download-package",
            TaskType::Install => "/executions/install",
            TaskType::RetrieveLog => "/executions/retrieve-log",
            TaskType::Reboot => "/executions/reboot",
            TaskType::SelfTest => "/executions/self-test",
            TaskType::Reset => "/executions/reset",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "task_status_enum")]
pub enum TaskStatus {
    #[sea_orm(string_value = "Scheduled")]
    Scheduled,
    #[sea_orm(string_value = "InProgress")]
    InProgress,
    #[sea_orm(string_value = "Complete")]
    Complete,
    #[sea_orm(string_value = "Failure")]
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failure)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Scheduled, TaskStatus::InProgress) => true,
            (TaskStatus::InProgress, TaskStatus::Complete | TaskStatus::Failure) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "asset_status_enum")]
pub enum AssetStatus {
    #[sea_orm(string_value = "Scheduled")]
    Scheduled,
    #[sea_orm(string_value = "InProgress")]
    InProgress,
    #[sea_orm(string_value = "Complete")]
    Complete,
    #[sea_orm(string_value = "ConnectionError")]
    ConnectionError,
    #[sea_orm(string_value = "DeviceError")]
    DeviceError,
    #[sea_orm(string_value = "SystemError")]
    SystemError,
}

impl AssetStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AssetStatus::Scheduled | AssetStatus::InProgress)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            AssetStatus::ConnectionError | AssetStatus::DeviceError | AssetStatus::SystemError
        )
    }

    pub fn can_transition_to(self, next: AssetStatus) -> bool {
        match (self, next) {
            (AssetStatus::Scheduled, AssetStatus::InProgress) => true,
            (AssetStatus::InProgress, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Outcome of a sub-device operation or a log retrieval. Independent of the
/// parent asset's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "result_status_enum")]
pub enum ResultStatus {
    #[sea_orm(string_value = "Succeed")]
    Succeed,
    #[sea_orm(string_value = "Error")]
    Error,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_transitions() {
        assert!(TaskStatus::Scheduled.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Complete));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Failure));

        assert!(!TaskStatus::Scheduled.can_transition_to(TaskStatus::Complete));
        assert!(!TaskStatus::Complete.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Failure.can_transition_to(TaskStatus::Complete));
        assert!(!TaskStatus::InProgress.can_transition_to(TaskStatus::InProgress));
    }

    #[test]
    fn test_asset_status_transitions() {
        assert!(AssetStatus::Scheduled.can_transition_to(AssetStatus::InProgress));
        for terminal in [
            AssetStatus::Complete,
            AssetStatus::ConnectionError,
            AssetStatus::DeviceError,
            AssetStatus::SystemError,
        ] {
            assert!(terminal.is_terminal());
            assert!(AssetStatus::InProgress.can_transition_to(terminal));
            assert!(!AssetStatus::Scheduled.can_transition_to(terminal));
            assert!(!terminal.can_transition_to(AssetStatus::InProgress));
        }
        assert!(!AssetStatus::Complete.is_error());
        assert!(AssetStatus::DeviceError.is_error());
    }

    #[test]
    fn test_task_type_classes() {
        assert!(TaskType::DownloadPackage.is_deployment());
        assert!(TaskType::Install.is_deployment());
        assert!(!TaskType::Reboot.is_deployment());
        assert!(TaskType::Reboot.has_sub_device_results());
        assert!(TaskType::SelfTest.has_sub_device_results());
        assert!(!TaskType::RetrieveLog.has_sub_device_results());
        assert!(TaskType::RetrieveLog.has_log_results());
    }
}
