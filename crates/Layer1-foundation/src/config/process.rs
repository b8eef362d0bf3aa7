//! Process Configuration - 출력 제한 및 실행 설정
//!
//! 글로벌 설정과 프로젝트 설정을 병합하며, 프로젝트 값이 우선한다.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 설정 파일명
pub const PROCESS_CONFIG_FILE: &str = "process.json";

/// 프로세스당 기본 최대 메시지 수
pub const DEFAULT_MESSAGE_LIMIT: usize = 1000;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_READ_BUFFER_SIZE: usize = 32 * 1024;

/// 프로세스 실행 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// 프로세스당 전달할 최대 출력 메시지 수 (초과 시 kill 요청)
    pub message_limit: usize,
    /// 프로세스별 limiter 입력 버퍼 크기
    pub channel_capacity: usize,
    /// stdout/stderr 한 번에 읽는 최대 바이트 수
    pub read_buffer_size: usize,
    /// run 요청의 기본 작업 디렉토리
    pub working_dir: Option<PathBuf>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            message_limit: DEFAULT_MESSAGE_LIMIT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            working_dir: None,
        }
    }
}

/// 파일에 기록된 값만 담는 부분 설정
#[derive(Debug, Clone, Default, Deserialize)]
struct ProcessConfigFile {
    message_limit: Option<usize>,
    channel_capacity: Option<usize>,
    read_buffer_size: Option<usize>,
    working_dir: Option<PathBuf>,
}

impl ProcessConfig {
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.message_limit == 0 {
            return Err(Error::Config("message_limit must be at least 1".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::Config(
                "read_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 설정 로드 (글로벌 + 프로젝트 병합)
    pub fn load() -> Result<Self> {
        let global = match dirs::config_dir() {
            Some(dir) => Self::load_file(&dir.join("playpen"))?,
            None => {
                tracing::debug!("Skipping global config: no config directory");
                None
            }
        };
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot get current directory: {}", e)))?;
        let project = Self::load_file(&cwd.join(".playpen"))?;

        let config = Self::merge(global.unwrap_or_default(), project.unwrap_or_default());
        config.validate()?;
        Ok(config)
    }

    /// `dir/process.json`에서만 로드 (파일이 없으면 기본값)
    pub fn load_from(dir: &Path) -> Result<Self> {
        let file = Self::load_file(dir)?.unwrap_or_default();
        let config = Self::merge(ProcessConfigFile::default(), file);
        config.validate()?;
        Ok(config)
    }

    fn load_file(dir: &Path) -> Result<Option<ProcessConfigFile>> {
        let path = dir.join(PROCESS_CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// 두 설정 병합 (project가 global을 오버라이드)
    fn merge(global: ProcessConfigFile, project: ProcessConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            message_limit: project
                .message_limit
                .or(global.message_limit)
                .unwrap_or(defaults.message_limit),
            channel_capacity: project
                .channel_capacity
                .or(global.channel_capacity)
                .unwrap_or(defaults.channel_capacity),
            read_buffer_size: project
                .read_buffer_size
                .or(global.read_buffer_size)
                .unwrap_or(defaults.read_buffer_size),
            working_dir: project.working_dir.or(global.working_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProcessConfig::default();
        assert_eq!(config.message_limit, 1000);
        assert!(config.working_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = ProcessConfig::default().with_message_limit(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_merge_project_wins() {
        let global = ProcessConfigFile {
            message_limit: Some(10),
            read_buffer_size: Some(128),
            working_dir: Some(PathBuf::from("/global")),
            ..Default::default()
        };
        let project = ProcessConfigFile {
            message_limit: Some(20),
            ..Default::default()
        };

        let merged = ProcessConfig::merge(global, project);
        assert_eq!(merged.message_limit, 20);
        assert_eq!(merged.read_buffer_size, 128);
        assert_eq!(merged.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(merged.working_dir, Some(PathBuf::from("/global")));
    }

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROCESS_CONFIG_FILE),
            r#"{ "message_limit": 5, "working_dir": "/srv/play" }"#,
        )
        .unwrap();

        let config = ProcessConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.message_limit, 5);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.working_dir, Some(PathBuf::from("/srv/play")));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessConfig::load_from(dir.path()).unwrap();
        assert_eq!(config, ProcessConfig::default());
    }

    #[test]
    fn test_load_from_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROCESS_CONFIG_FILE), "{ nope").unwrap();
        assert!(matches!(
            ProcessConfig::load_from(dir.path()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_load_from_rejects_zero_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROCESS_CONFIG_FILE),
            r#"{ "message_limit": 0 }"#,
        )
        .unwrap();
        assert!(matches!(
            ProcessConfig::load_from(dir.path()),
            Err(Error::Config(_))
        ));
    }
}
