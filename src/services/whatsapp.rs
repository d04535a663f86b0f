//! WhatsApp Checkout Handoff
//!
//! 결제 게이트웨이 없이 주문 요약을 WhatsApp 메시지로 넘김.
//! `https://wa.me/<번호>?text=<메시지>` 링크를 열면 채팅이 미리 채워짐.

use std::fmt::Write;

use url::form_urlencoded::byte_serialize;

use crate::db::{Order, StoreSettings};

const WA_BASE: &str = "https://wa.me/";

/// 국가 코드 (로컬 번호 0xxx → 62xxx)
const DEFAULT_COUNTRY_CODE: &str = "62";

/// 숫자만 남기고 로컬 번호 앞자리 0을 국가 코드로 변환
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('0') {
        Some(rest) => format!("{}{}", DEFAULT_COUNTRY_CODE, rest),
        None => digits,
    }
}

/// 메시지가 채워진 WhatsApp 링크 생성
///
/// form 인코딩의 `+`(공백)는 `%20`으로 바꿈. 원래 `+` 문자는 이미 `%2B`로 인코딩되어 있음
pub fn whatsapp_link(phone: &str, message: &str) -> String {
    let text = byte_serialize(message.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("{}{}?text={}", WA_BASE, normalize_phone(phone), text)
}

/// 1250000 → "Rp 1.250.000"
pub fn format_rupiah(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-Rp {}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

/// 주문 확인 메시지
pub fn order_message(settings: &StoreSettings, order: &Order) -> String {
    let mut msg = String::new();

    // write!는 String에 대해 실패하지 않음
    let _ = writeln!(msg, "Halo {}, saya ingin memesan:", settings.store_name);
    let _ = writeln!(msg);
    let _ = writeln!(msg, "Order ID: {}", order.id);
    let _ = writeln!(msg, "Nama: {}", order.customer_name);
    let _ = writeln!(msg, "WhatsApp: {}", order.customer_phone);
    if let Some(email) = &order.customer_email {
        let _ = writeln!(msg, "Email: {}", email);
    }
    let _ = writeln!(msg);

    for (i, item) in order.items.iter().enumerate() {
        let _ = writeln!(
            msg,
            "{}. {} x{} = {}",
            i + 1,
            item.product_name,
            item.quantity,
            format_rupiah(item.price * item.quantity)
        );
    }
    let _ = writeln!(msg);

    let _ = writeln!(msg, "Subtotal: {}", format_rupiah(order.subtotal));
    if let Some(code) = &order.voucher_code {
        let _ = writeln!(
            msg,
            "Voucher ({}): -{}",
            code,
            format_rupiah(order.discount_amount)
        );
    }
    let _ = writeln!(msg, "Total: {}", format_rupiah(order.total));

    if !settings.payment_instructions.trim().is_empty() {
        let _ = writeln!(msg);
        let _ = writeln!(msg, "{}", settings.payment_instructions.trim());
    }

    msg.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{OrderItem, OrderStatus};
    use chrono::Utc;
    use sqlx::types::Json;
    use uuid::Uuid;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("0812-3456-789"), "628123456789");
        assert_eq!(normalize_phone("+62 812 3456 789"), "628123456789");
    }

    #[test]
    fn test_whatsapp_link_encodes_message() {
        let link = whatsapp_link("08123456789", "Halo & terima kasih\nTotal: Rp 10.000");
        assert!(link.starts_with("https://wa.me/628123456789?text="));
        assert!(!link.contains(' '));
        assert!(!link.contains('\n'));
        assert!(link.contains("Halo%20%26%20terima"));
        assert!(link.contains("%0A"));
    }

    #[test]
    fn test_format_rupiah() {
        assert_eq!(format_rupiah(0), "Rp 0");
        assert_eq!(format_rupiah(999), "Rp 999");
        assert_eq!(format_rupiah(1_250_000), "Rp 1.250.000");
    }

    #[test]
    fn test_order_message_contains_summary() {
        let settings = StoreSettings {
            store_name: "Toko Digital".to_string(),
            payment_instructions: "Transfer ke BCA 123".to_string(),
            ..Default::default()
        };
        let order = Order {
            id: Uuid::new_v4(),
            buyer_id: None,
            customer_name: "Andi".to_string(),
            customer_phone: "0812".to_string(),
            customer_email: None,
            items: Json(vec![OrderItem {
                product_id: Uuid::new_v4(),
                product_name: "Notion Template".to_string(),
                quantity: 2,
                price: 50_000,
                cost_price: 10_000,
            }]),
            subtotal: 100_000,
            discount_amount: 10_000,
            voucher_code: Some("HEMAT10".to_string()),
            total: 90_000,
            status: OrderStatus::Pending,
            commission_paid: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let msg = order_message(&settings, &order);
        assert!(msg.contains("Toko Digital"));
        assert!(msg.contains("Notion Template x2 = Rp 100.000"));
        assert!(msg.contains("Voucher (HEMAT10): -Rp 10.000"));
        assert!(msg.contains("Total: Rp 90.000"));
        assert!(msg.ends_with("Transfer ke BCA 123"));
    }
}
