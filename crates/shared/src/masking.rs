//! 日志脱敏辅助函数
//!
//! 学员邮箱属于个人信息，不得以明文出现在日志里。
//! 处理管道在记录订单/行项目日志时统一经过脱敏。

/// 邮箱脱敏：保留首字符和 @ 后域名
///
/// 示例: `kevin@example.com` -> `k***@example.com`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            if local.is_empty() {
                return format!("***@{domain}");
            }
            let first_char: String = local.chars().next().unwrap().to_string();
            format!("{first_char}***@{domain}")
        }
        // 格式不合法时全部遮蔽
        None => "***".to_string(),
    }
}
