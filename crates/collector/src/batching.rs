use std::collections::BTreeSet;

/// 按批次大小切分会话ID
///
/// 返回所有满批次以及不足一批的剩余部分。
pub fn chunk_sessions(session_ids: &[String], batch_size: usize) -> (Vec<Vec<String>>, Vec<String>) {
    if batch_size == 0 {
        return (Vec::new(), session_ids.to_vec());
    }

    let mut full = Vec::new();
    let mut remainder = Vec::new();
    for chunk in session_ids.chunks(batch_size) {
        if chunk.len() == batch_size {
            full.push(chunk.to_vec());
        } else {
            remainder = chunk.to_vec();
        }
    }
    (full, remainder)
}

/// 对象存储列出的目录名与候选ID的有序交集
pub fn uploaded_members(listed: &[String], candidates: &[String]) -> Vec<String> {
    let uploaded: BTreeSet<&str> = listed
        .iter()
        .map(|name| name.trim_end_matches('/'))
        .collect();
    let candidates: BTreeSet<&str> = candidates.iter().map(String::as_str).collect();
    uploaded
        .intersection(&candidates)
        .map(|id| id.to_string())
        .collect()
}
