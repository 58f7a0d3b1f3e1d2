//! Webhook 签名校验模块
//!
//! 店铺端对请求原始字节计算 HMAC-SHA256 并以 base64 编码放入签名头。
//! 本模块用共享密钥重新计算并做常数时间比较，是所有处理发生之前的
//! 第一道防线：签名不通过的请求不会触碰任何持久化状态。

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 校验 Webhook 签名
///
/// `presented_signature` 为请求头携带的 base64 文本。比较通过
/// `Mac::verify_slice` 完成（内部常数时间）；HMAC 在解码展示签名之前
/// 计算，使格式非法与签名错误两种拒绝路径的主要耗时一致，不向调用方
/// 泄露区分两者的时间信息。对结构合法的输入永不返回错误，只返回布尔。
pub fn verify(secret: &str, payload: &[u8], presented_signature: &str) -> bool {
    // HMAC 允许任意长度密钥，new_from_slice 实际不会失败；
    // 仍然走 match 以避免在库代码中 unwrap
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);

    match BASE64.decode(presented_signature) {
        Ok(decoded) => mac.verify_slice(&decoded).is_ok(),
        // base64 字母表/长度非法：直接拒绝（HMAC 已经算过）
        Err(_) => false,
    }
}

/// 对负载计算 base64 编码的 HMAC-SHA256 签名
///
/// 与 `verify` 互逆，测试和本地联调时用来伪造店铺端签名。
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload);
    BASE64.encode(mac.finalize().into_bytes())
}
