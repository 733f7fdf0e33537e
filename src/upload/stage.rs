use super::transport::ServerPhase;
use super::types::UploadStage;

// 各阶段在总体进度中的固定权重带（百分比区间）
const PREPARING: (f64, f64) = (0.0, 5.0);
const UPLOADING: (f64, f64) = (5.0, 50.0);
const ASSEMBLING: (f64, f64) = (50.0, 60.0);
const CONVERTING: (f64, f64) = (60.0, 75.0);
const EXTRACTING: (f64, f64) = (75.0, 80.0);
const SEGMENTING: (f64, f64) = (80.0, 85.0);
const TRANSCRIBING: (f64, f64) = (85.0, 100.0);

/// 带内插值，子进度缺省按 0 处理
fn band(range: (f64, f64), fraction: Option<f64>) -> f64 {
    let fraction = fraction.unwrap_or(0.0).clamp(0.0, 1.0);
    range.0 + (range.1 - range.0) * fraction
}

/// 纯函数：由阶段与各子进度算出总体百分比
///
/// - `upload_fraction` 是 uploaded_bytes / total_bytes（0..=1）
/// - `conversion` / `transcription` 是服务端报告的 0..=100
/// - 结果恒在 [0, 100]；单调性由调用方对历史值取 max 保证
pub fn overall_percent(
    stage: UploadStage,
    upload_fraction: f64,
    conversion: Option<f64>,
    transcription: Option<f64>,
) -> f64 {
    let value = match stage {
        UploadStage::Idle => 0.0,
        UploadStage::Preparing => band(PREPARING, None),
        UploadStage::Uploading | UploadStage::Paused => band(UPLOADING, Some(upload_fraction)),
        UploadStage::Assembling => band(ASSEMBLING, None),
        UploadStage::Converting => band(CONVERTING, conversion.map(|p| p / 100.0)),
        UploadStage::Extracting => band(EXTRACTING, None),
        UploadStage::Segmenting => band(SEGMENTING, None),
        UploadStage::Transcribing => band(TRANSCRIBING, transcription.map(|p| p / 100.0)),
        UploadStage::Completed => 100.0,
        // 终态失败/取消不再产生新进度
        UploadStage::Failed | UploadStage::Cancelled => 0.0,
    };

    value.clamp(0.0, 100.0)
}

impl From<ServerPhase> for UploadStage {
    fn from(phase: ServerPhase) -> Self {
        match phase {
            ServerPhase::Assembling => UploadStage::Assembling,
            ServerPhase::Converting => UploadStage::Converting,
            ServerPhase::Extracting => UploadStage::Extracting,
            ServerPhase::Segmenting => UploadStage::Segmenting,
            ServerPhase::Transcribing => UploadStage::Transcribing,
            ServerPhase::Completed => UploadStage::Completed,
            ServerPhase::Failed => UploadStage::Failed,
        }
    }
}
