use anyhow::Result;
use futures::executor::block_on;
use landcover_dash::collect::region_stats::StaticFileSource;
use landcover_dash::geometric::land_cover::ClassCode;
use landcover_dash::geometric::layer_registry::MemorySurface;
use landcover_dash::{BootstrapLoader, DashboardConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Example: drive the dashboard without a browser
/// Loads the bundled India statistics, then filters on one class and back
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("=== Example: Headless land cover dashboard ===\n");

    let config = DashboardConfig {
        data_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data"),
        output_path: Some("./output".to_string()),
        ..DashboardConfig::default()
    };
    println!("Statistics file: {:?}\n", config.region_file_path());

    let source = StaticFileSource::new(&config.data_dir)
        .with_file_template(config.region_file_template.clone());
    let loader = BootstrapLoader::from_config(&config)?;
    let mut dashboard = block_on(loader.load(MemorySurface::new(), &source))?;

    println!(
        "Map view: lat {:.2}, lon {:.2}, zoom {}",
        dashboard.view.center_lat, dashboard.view.center_lon, dashboard.view.zoom
    );
    println!(
        "Visible layers: {:?}\n",
        dashboard.controller.registry().surface().visible_ids()
    );
    println!("{}", dashboard.controller.payload().to_text());

    // Filter on tree cover
    let tree_cover = ClassCode(10);
    let payload = dashboard.controller.select_class(tree_cover)?;
    println!("--- Filtered on class {} ---", tree_cover);
    println!(
        "Visible layers: {:?}",
        dashboard.controller.registry().surface().visible_ids()
    );
    println!("{}", payload.to_text());
    if let Some(view) = payload.view() {
        for segment in &view.pie {
            println!(
                "  pie: {} {:.2}% ({})",
                segment.label,
                segment.percent,
                segment.color.to_hex()
            );
        }
    }

    // Selecting the same class again clears the filter
    let payload = dashboard.controller.select_class(tree_cover)?;
    println!("\n--- Filter cleared ---");
    println!(
        "Visible layers: {:?}",
        dashboard.controller.registry().surface().visible_ids()
    );
    println!("{}", payload.to_text());

    #[cfg(feature = "csv")]
    {
        use landcover_dash::commons::export::CsvExportSink;

        let output = dashboard
            .geo_core
            .get_output_path()
            .cloned()
            .unwrap_or_else(|| "./output".to_string());
        let mut sink = CsvExportSink::new(output, dashboard.controller.renderer().classes().clone());
        dashboard.export_stats(&mut sink)?;
        println!("✅ Statistics exported to {:?}", sink.written());
    }

    Ok(())
}
