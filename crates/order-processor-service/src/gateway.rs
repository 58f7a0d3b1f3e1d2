//! 选课网关客户端
//!
//! 将 LMS 注册 API 封装为统一接口，并通过 trait 抽象以支持
//! 单元测试中的 mock 注入。调用前先做邮箱语法校验，格式非法的
//! 邮箱不消耗网络往返。瞬时故障（超时、5xx）按共享重试策略退避
//! 重试，重试用尽后作为行项目层面的失败上报。

use async_trait::async_trait;
use enroll_shared::config::GatewayConfig;
use enroll_shared::error::EnrollError;
use enroll_shared::masking::mask_email;
use enroll_shared::retry::{RetryPolicy, retry_with_policy};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};
use validator::ValidateEmail;

use crate::error::ProcessorError;

// ---------------------------------------------------------------------------
// Trait 抽象 — 便于测试时替换为 mock 实现
// ---------------------------------------------------------------------------

/// 选课网关的抽象接口
///
/// 提取 trait 使得处理器可以通过 Arc<dyn> 注入依赖，
/// 测试时无需真实的 LMS 服务。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrollmentGateway: Send + Sync {
    /// 以邮箱身份注册指定课程
    ///
    /// 幂等性由调用方的行项目状态保证：同一 (sku, email) 只会在
    /// 行项目仍为 unprocessed 时被调用。
    async fn enroll(&self, sku: &str, email: &str) -> Result<(), ProcessorError>;
}

// ---------------------------------------------------------------------------
// HTTP 客户端实现
// ---------------------------------------------------------------------------

/// LMS 注册 API 请求体
#[derive(Serialize)]
struct EnrollmentRequest<'a> {
    course_id: &'a str,
    email: &'a str,
    auto_enroll: bool,
    email_students: bool,
}

/// LMS 注册 API 客户端
pub struct EnrollmentApiClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    email_students: bool,
    retry_policy: RetryPolicy,
}

impl EnrollmentApiClient {
    /// 根据配置创建客户端
    ///
    /// 单次请求超时由 reqwest 客户端统一控制；重试由 `enroll`
    /// 内部的退避策略负责。
    pub fn new(config: &GatewayConfig) -> Result<Self, EnrollError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| EnrollError::Internal(format!("创建 HTTP 客户端失败: {e}")))?;

        info!(base_url = %config.base_url, "选课网关客户端已初始化");

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            email_students: config.email_students,
            retry_policy: RetryPolicy::default(),
        })
    }
}

/// 判定错误是否为值得重试的瞬时故障
fn is_transient(err: &EnrollError) -> bool {
    matches!(
        err,
        EnrollError::ExternalServiceTimeout { .. } | EnrollError::ExternalService { .. }
    )
}

/// 将 LMS 响应状态映射为注册结果
///
/// 外层 Err 表示瞬时故障（交给重试策略）；内层 Err 表示确定性的
/// 业务失败，重试只会得到相同答案。
fn classify_response(
    status: StatusCode,
    body: &str,
    sku: &str,
) -> Result<Result<(), ProcessorError>, EnrollError> {
    if status.is_success() {
        return Ok(Ok(()));
    }

    if status == StatusCode::NOT_FOUND {
        return Ok(Err(ProcessorError::UnknownCourse {
            sku: sku.to_string(),
        }));
    }

    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        return Ok(Err(ProcessorError::EnrollmentRejected {
            reason: format!("HTTP {status}: {body}"),
        }));
    }

    if status.is_server_error() {
        return Err(EnrollError::ExternalService {
            service: "lms".to_string(),
            message: format!("HTTP {status}"),
        });
    }

    // 401/403 等：凭证或权限配置问题，重试无意义
    Ok(Err(ProcessorError::GatewayUnavailable(format!(
        "HTTP {status}"
    ))))
}

#[async_trait]
impl EnrollmentGateway for EnrollmentApiClient {
    async fn enroll(&self, sku: &str, email: &str) -> Result<(), ProcessorError> {
        // 邮箱语法校验前置，非法邮箱不消耗网络往返
        if !email.validate_email() {
            return Err(ProcessorError::EnrollmentRejected {
                reason: format!("邮箱格式不合法: {}", mask_email(email)),
            });
        }

        let url = format!("{}/api/enrollment/v1/enrollments", self.base_url);
        let request = EnrollmentRequest {
            course_id: sku,
            email,
            auto_enroll: true,
            email_students: self.email_students,
        };

        debug!(sku, email = %mask_email(email), "调用 LMS 注册 API");

        let outcome = retry_with_policy(&self.retry_policy, "lms_enroll", is_transient, || async {
            let mut req = self.http.post(&url).json(&request);
            if !self.api_token.is_empty() {
                req = req.bearer_auth(&self.api_token);
            }

            let response = req.send().await.map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    EnrollError::ExternalServiceTimeout {
                        service: "lms".to_string(),
                    }
                } else {
                    EnrollError::ExternalService {
                        service: "lms".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            classify_response(status, &body, sku)
        })
        .await;

        match outcome {
            Ok(result) => result,
            // 重试已用尽的瞬时故障，作为行项目层面的失败上报
            Err(e) => Err(ProcessorError::GatewayUnavailable(e.to_string())),
        }
    }
}
