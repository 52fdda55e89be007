//! Layout chain resolution for app pages

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{PageType, SegmentConfig, StaticInfo, StaticInfoExtractor, StaticInfoRequest};
use crate::error::BuildResult;
use crate::routes::is_app_page_route;

/// Static info for an app page with its layouts' segment config folded in.
///
/// Layouts are applied root-first and the page last, so the nearest
/// explicitly set value wins. Anything that isn't an app `/page` is
/// returned unchanged.
pub async fn static_info_including_layouts(
    extractor: &StaticInfoExtractor,
    request: StaticInfoRequest<'_>,
    app_dir: Option<&Path>,
    page_extensions: &[String],
) -> BuildResult<StaticInfo> {
    let info = extractor.extract(request).await?;

    let Some(app_dir) = app_dir else {
        return Ok(info);
    };
    if request.page_type != PageType::App || !is_app_page_route(request.page) {
        return Ok(info);
    }

    let layouts = layout_files(request.page_file_path, app_dir, page_extensions).await;
    debug!("{} has {} layout(s)", request.page, layouts.len());

    // Nearest layout first; reversed below so the root applies first
    let mut segments = Vec::with_capacity(layouts.len() + 1);
    for layout in &layouts {
        let layout_info = extractor
            .extract(StaticInfoRequest {
                page_file_path: layout,
                page: request.page,
                page_type: PageType::App,
                dev: request.dev,
            })
            .await?;
        segments.push(layout_info.config);
    }
    segments.reverse();
    segments.push(info.config.clone());

    let config = SegmentConfig::reduce(&segments);

    Ok(StaticInfo {
        runtime: config.runtime,
        revalidate: config.revalidate,
        preferred_region: config.preferred_region.clone(),
        max_duration: config.max_duration,
        config,
        ..info
    })
}

/// `layout.<ext>` files from the page's directory up to the app root, nearest first
async fn layout_files(page_file_path: &Path, app_dir: &Path, page_extensions: &[String]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut dir = page_file_path.parent();

    while let Some(current) = dir {
        if !current.starts_with(app_dir) {
            break;
        }
        for ext in page_extensions {
            let candidate = current.join(format!("layout.{}", ext));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                found.push(candidate);
            }
        }
        dir = current.parent();
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Revalidate, ServerRuntime};
    use pretty_assertions::assert_eq;
    use std::fs;

    fn exts() -> Vec<String> {
        ["tsx", "ts", "jsx", "js"].iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_root_layout_runtime_reaches_nested_page() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        let nested = app.join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        fs::write(app.join("layout.tsx"), "export const runtime = 'edge'\nexport const revalidate = 60").unwrap();
        fs::write(app.join("a/layout.tsx"), "export const revalidate = 30").unwrap();
        fs::write(app.join("a/b/layout.js"), "export default function Layout() {}").unwrap();
        fs::write(nested.join("page.tsx"), "export default function Page() {}").unwrap();

        let page_file = nested.join("page.tsx");
        let info = static_info_including_layouts(
            &StaticInfoExtractor::new(),
            StaticInfoRequest {
                page_file_path: &page_file,
                page: "/a/b/c/page",
                page_type: PageType::App,
                dev: false,
            },
            Some(&app),
            &exts(),
        )
        .await
        .unwrap();

        assert_eq!(info.runtime, Some(ServerRuntime::Edge));
        assert_eq!(info.revalidate, Some(Revalidate::Seconds(30)));
    }

    #[tokio::test]
    async fn test_page_value_overrides_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        fs::create_dir_all(app.join("blog")).unwrap();
        fs::write(app.join("layout.tsx"), "export const runtime = 'edge'").unwrap();
        fs::write(app.join("blog/page.tsx"), "export const runtime = 'nodejs'").unwrap();

        let page_file = app.join("blog/page.tsx");
        let info = static_info_including_layouts(
            &StaticInfoExtractor::new(),
            StaticInfoRequest {
                page_file_path: &page_file,
                page: "/blog/page",
                page_type: PageType::App,
                dev: false,
            },
            Some(&app),
            &exts(),
        )
        .await
        .unwrap();

        assert_eq!(info.runtime, Some(ServerRuntime::NodeJs));
    }

    #[tokio::test]
    async fn test_page_dynamic_params_survive_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        fs::create_dir_all(app.join("posts/[id]")).unwrap();
        fs::write(app.join("layout.tsx"), "export const dynamicParams = true").unwrap();
        fs::write(app.join("posts/[id]/page.tsx"), "export const dynamicParams = false").unwrap();

        let page_file = app.join("posts/[id]/page.tsx");
        let info = static_info_including_layouts(
            &StaticInfoExtractor::new(),
            StaticInfoRequest {
                page_file_path: &page_file,
                page: "/posts/[id]/page",
                page_type: PageType::App,
                dev: false,
            },
            Some(&app),
            &exts(),
        )
        .await
        .unwrap();

        assert_eq!(info.config.dynamic_params, Some(false));
    }

    #[tokio::test]
    async fn test_route_handlers_ignore_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        fs::create_dir_all(app.join("api")).unwrap();
        fs::write(app.join("layout.tsx"), "export const runtime = 'edge'").unwrap();
        fs::write(app.join("api/route.ts"), "export async function GET() {}").unwrap();

        let route_file = app.join("api/route.ts");
        let info = static_info_including_layouts(
            &StaticInfoExtractor::new(),
            StaticInfoRequest {
                page_file_path: &route_file,
                page: "/api/route",
                page_type: PageType::App,
                dev: false,
            },
            Some(&app),
            &exts(),
        )
        .await
        .unwrap();

        assert_eq!(info.runtime, None);
    }
}
