//! 通用工具函数

use chrono::NaiveDate;

use crate::models::Coordinates;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// 两点间的大圆距离（公里）
pub fn haversine_km(from: &Coordinates, to: &Coordinates) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// 生成显示用流水号，格式 YYYYMMDD-NNNNN
pub fn format_display_code(date: NaiveDate, counter: u64) -> String {
    format!("{}-{:05}", date.format("%Y%m%d"), counter)
}

/// 验证流水号格式
pub fn is_valid_display_code(code: &str) -> bool {
    match code.split_once('-') {
        Some((date, counter)) => {
            date.len() == 8
                && NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
                && counter.len() >= 5
                && counter.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// 电话号码去掉分隔符后应为 8 到 15 位数字
pub fn is_valid_phone(phone: &str) -> bool {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.'))
    {
        return false;
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    (8..=15).contains(&digits)
}
