//! 多代理回退解析器
//! 按声明顺序逐个尝试代理策略，第一个返回有效数据的策略胜出

use crate::http_client::{Fetcher, HttpClientError};
use crate::parser::{PayloadParser, ShapeError};
use crate::strategy::{ProxyStrategy, UpstreamTarget};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("代理服务 {strategy} 请求失败: {source}")]
    TransportFailure {
        strategy: &'static str,
        #[source]
        source: HttpClientError,
    },
    #[error("代理服务 {strategy} 返回数据无效: {source}")]
    ShapeViolation {
        strategy: &'static str,
        #[source]
        source: ShapeError,
    },
    #[error("所有代理服务都失败，最后错误: {last_error}")]
    AllStrategiesExhausted {
        last_error: String,
        attempted: Vec<String>,
    },
}

/// 成功解析的结果
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    /// 胜出的策略
    pub strategy: &'static str,
    /// 按顺序尝试过的策略，含胜出者
    pub attempted: Vec<String>,
}

#[derive(Default)]
struct Attempts {
    attempted: Vec<String>,
    last_error: Option<String>,
}

pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    strategies: Vec<Arc<dyn ProxyStrategy>>,
    attempt_timeout: Duration,
    budget: Option<Duration>,
}

impl Resolver {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        strategies: Vec<Arc<dyn ProxyStrategy>>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            strategies,
            attempt_timeout,
            budget: None,
        }
    }

    /// 整条策略链的总时限
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// 所有策略都超时的最坏耗时
    pub fn worst_case(&self) -> Duration {
        self.attempt_timeout * self.strategies.len() as u32
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    pub async fn resolve<P: PayloadParser>(
        &self,
        url: &str,
        parser: &P,
    ) -> Result<Resolved<P::Output>, ResolveError> {
        let target = UpstreamTarget {
            url: url.to_string(),
            accept: parser.accept(),
        };
        let mut attempts = Attempts::default();

        let run = self.run_chain(&target, parser, &mut attempts);
        let outcome = match self.budget {
            Some(budget) => tokio::time::timeout(budget, run).await.ok(),
            None => Some(run.await),
        };

        match outcome {
            Some(Some((value, strategy))) => Ok(Resolved {
                value,
                strategy,
                attempted: attempts.attempted,
            }),
            Some(None) => Err(Self::exhausted(attempts)),
            None => {
                warn!("请求 {} 超出总时限 {:?}", target.url, self.budget);
                if let Some(budget) = self.budget {
                    attempts.last_error = Some(format!("超出总时限 {}ms", budget.as_millis()));
                }
                Err(Self::exhausted(attempts))
            }
        }
    }

    async fn run_chain<P: PayloadParser>(
        &self,
        target: &UpstreamTarget,
        parser: &P,
        attempts: &mut Attempts,
    ) -> Option<(P::Output, &'static str)> {
        for strategy in &self.strategies {
            let name = strategy.name();
            attempts.attempted.push(name.to_string());
            debug!("尝试代理服务: {}", name);

            match self.attempt(strategy.as_ref(), target, parser).await {
                Ok(value) => {
                    info!("代理服务 {} 成功: {}", name, target.url);
                    return Some((value, name));
                }
                Err(e) => {
                    warn!("{}", e);
                    attempts.last_error = Some(e.to_string());
                }
            }
        }
        None
    }

    async fn attempt<P: PayloadParser>(
        &self,
        strategy: &dyn ProxyStrategy,
        target: &UpstreamTarget,
        parser: &P,
    ) -> Result<P::Output, ResolveError> {
        let request = strategy.build_request(target);
        debug!("{} -> {}", strategy.name(), request.url);

        // 单次尝试时限
        let fetched = tokio::time::timeout(
            self.attempt_timeout,
            self.fetcher.fetch(&request, self.attempt_timeout),
        )
        .await
        .unwrap_or(Err(HttpClientError::Timeout));
        let body = fetched.map_err(|source| ResolveError::TransportFailure {
            strategy: strategy.name(),
            source,
        })?;

        let shape_violation = |source| ResolveError::ShapeViolation {
            strategy: strategy.name(),
            source,
        };
        let inner = strategy.unwrap_response(body).map_err(shape_violation)?;
        parser.parse(&inner).map_err(shape_violation)
    }

    fn exhausted(attempts: Attempts) -> ResolveError {
        ResolveError::AllStrategiesExhausted {
            last_error: attempts
                .last_error
                .unwrap_or_else(|| "未配置代理服务".to_string()),
            attempted: attempts.attempted,
        }
    }
}
