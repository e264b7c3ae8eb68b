use shuffler_core::models::{CheckInResult, EligibilityTaskInfo, OpenIterationCandidate, TaskInfo};

/// 将各候选迭代的签到结果归约为一个，状态码最小者优先
///
/// 没有任何候选迭代时为 `ITERATION_NOT_ACTIVE`。
pub fn reduce_check_in_results<I>(results: I) -> CheckInResult
where
    I: IntoIterator<Item = CheckInResult>,
{
    results
        .into_iter()
        .min_by_key(|result| result.code())
        .unwrap_or(CheckInResult::IterationNotActive)
}

/// 按流量权重选择候选迭代
///
/// `draw` 为 `[1, total]` 内的随机数，返回第一个累计权重不小于 `draw` 的候选。
/// 权重为 0 的候选永远不会被选中。
pub fn pick_weighted(candidates: &[OpenIterationCandidate], draw: i64) -> Option<&OpenIterationCandidate> {
    let mut accumulated = 0;
    candidates
        .iter()
        .filter(|candidate| candidate.traffic_weight() > 0)
        .find(|candidate| {
            accumulated += candidate.traffic_weight();
            accumulated >= draw
        })
}

pub fn total_weight(candidates: &[OpenIterationCandidate]) -> i64 {
    candidates
        .iter()
        .map(|candidate| candidate.traffic_weight().max(0))
        .sum()
}

/// 下发给设备的资格策略，最小间隔策略注入当前迭代序号；评估任务不下发
pub fn eligibility_for(iteration_id: i64, task_info: &TaskInfo) -> Option<EligibilityTaskInfo> {
    if !task_info.is_training() {
        return None;
    }
    let mut info = task_info.eligibility_task_info.clone()?;
    for policy in &mut info.eligibility_policies {
        if let Some(min_separation) = policy.min_separation_policy.as_mut() {
            min_separation.current_index = iteration_id;
        }
    }
    Some(info)
}
