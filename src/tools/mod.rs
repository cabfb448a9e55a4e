//! 工具层：Tool trait、注册表、单次调用包装与内置中医药工具

pub mod executor;
pub mod herbs;
pub mod literature;
pub mod meridians;
pub mod registry;
pub mod safety;

use std::time::Duration;

pub use executor::ToolExecutor;
pub use herbs::{HerbLookupTool, HerbsByCategoryTool};
pub use literature::{PubMed, PubMedSearchTool, SystematicReviewTool};
pub use meridians::{MeridianListTool, MeridianLookupTool, MeridiansByElementTool};
pub use registry::{Tool, ToolRegistry};
pub use safety::{DosageValidateTool, PregnancyCheckTool, ToxicityCheckTool};

/// PubMed 单次 HTTP 请求超时
const PUBMED_TIMEOUT: Duration = Duration::from_secs(15);

/// 进程启动时构建一次的内置工具注册表
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(HerbLookupTool);
    registry.register(HerbsByCategoryTool);
    registry.register(MeridianLookupTool);
    registry.register(MeridianListTool);
    registry.register(MeridiansByElementTool);
    registry.register(ToxicityCheckTool);
    registry.register(PregnancyCheckTool);
    registry.register(DosageValidateTool);

    let pubmed = PubMed::new(literature::EUTILS_BASE, PUBMED_TIMEOUT);
    registry.register(PubMedSearchTool::new(pubmed.clone()));
    registry.register(SystematicReviewTool::new(pubmed));
    registry
}
