//! Guard against statements with too many bind parameters

use async_trait::async_trait;
use connwatch_core::{ConnwatchError, Result};

use super::listener::{QueryInfo, QueryListener};

/// Default maximum number of bind parameters per statement
pub const DEFAULT_MAX_PARAMS: usize = 1000;

/// Rejects statements that bind more than `max_params` parameters
///
/// Many databases cap the parameter count of a statement; catching large
/// IN-lists here keeps tests from passing on one database and failing on
/// another.
#[derive(Debug, Clone)]
pub struct ParamLimitListener {
    max_params: usize,
}

impl ParamLimitListener {
    pub fn new(max_params: usize) -> Self {
        Self { max_params }
    }

    pub fn max_params(&self) -> usize {
        self.max_params
    }
}

impl Default for ParamLimitListener {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARAMS)
    }
}

#[async_trait]
impl QueryListener for ParamLimitListener {
    async fn before_query(&self, info: &QueryInfo) -> Result<()> {
        let count = info.param_count();
        if count > self.max_params {
            tracing::warn!(
                params = count,
                max_params = self.max_params,
                "rejecting statement with too many bind parameters"
            );
            return Err(ConnwatchError::Query(format!(
                "Statement has {} bind parameters, more than the allowed {}",
                count, self.max_params
            )));
        }
        Ok(())
    }
}
