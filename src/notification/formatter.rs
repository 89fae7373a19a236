//! 通知显示格式化 - 相对时间和终端行输出

use chrono::{DateTime, Utc};

use super::payload::Notification;

/// 相对时间（"刚刚" / "5 分钟前" / "3 小时前" / "2 天前" / 日期）
pub fn format_relative(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created_at);
    let secs = elapsed.num_seconds();

    if secs < 60 {
        "刚刚".to_string()
    } else if secs < 3600 {
        format!("{} 分钟前", elapsed.num_minutes())
    } else if secs < 86_400 {
        format!("{} 小时前", elapsed.num_hours())
    } else if secs < 7 * 86_400 {
        format!("{} 天前", elapsed.num_days())
    } else {
        created_at.format("%Y-%m-%d").to_string()
    }
}

/// 单行输出：`[身份] 标题 - 消息 (时间) → 关联实体`
pub fn format_row(notification: &Notification, now: DateTime<Utc>) -> String {
    let mut row = format!("[{}]", notification.identity);

    let title = notification.title.trim();
    let message = notification.message.trim();
    match (title.is_empty(), message.is_empty()) {
        (false, false) => row.push_str(&format!(" {} - {}", title, message)),
        (false, true) => row.push_str(&format!(" {}", title)),
        (true, false) => row.push_str(&format!(" {}", message)),
        (true, true) => row.push_str(" (无内容)"),
    }

    if let Some(created_at) = notification.created_at {
        row.push_str(&format!(" ({})", format_relative(created_at, now)));
    }
    if let Some(entity) = &notification.related_entity_id {
        row.push_str(&format!(" → {}", entity));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_format_relative_buckets() {
        let now = Utc::now();
        assert_eq!(format_relative(now - Duration::seconds(10), now), "刚刚");
        assert_eq!(format_relative(now - Duration::minutes(5), now), "5 分钟前");
        assert_eq!(format_relative(now - Duration::hours(3), now), "3 小时前");
        assert_eq!(format_relative(now - Duration::days(2), now), "2 天前");
    }

    #[test]
    fn test_format_relative_old_dates() {
        let created = DateTime::parse_from_rfc3339("2026-01-02T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let now = created + Duration::days(30);
        assert_eq!(format_relative(created, now), "2026-01-02");
    }

    #[test]
    fn test_future_timestamp_is_now() {
        let now = Utc::now();
        assert_eq!(format_relative(now + Duration::minutes(3), now), "刚刚");
    }

    #[test]
    fn test_format_row() {
        let now = Utc::now();
        let n = Notification::from_value(json!({
            "id": "n1",
            "title": "Complaint",
            "message": "Answered",
            "alertId": "a1"
        }));
        assert_eq!(format_row(&n, now), "[n1] Complaint - Answered → a1");

        let empty = Notification::from_value(json!({"id": "n2"}));
        assert_eq!(format_row(&empty, now), "[n2] (无内容)");
    }
}
