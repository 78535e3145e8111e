use std::path::Path;

use ctxpack::app::pack_config::{ConfigGenerator, OutputStyle};
use insta::assert_snapshot;

#[test]
fn pack_config_default_renders() {
    let config = ConfigGenerator::new()
        .with_style(OutputStyle::Xml)
        .build(Path::new("/results/abcd1234-2024-09-25T12-30-45-pack.xml"));
    let rendered = serde_json::to_string_pretty(&config).expect("serialize pack config");
    assert_snapshot!("pack_config_default", rendered);
}
