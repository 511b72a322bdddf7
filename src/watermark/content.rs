use super::WatermarkConfig;

/// Text lines of the watermark in drawing order: area, content, time, then
/// custom items. Empty values are left out; the time line is always present.
pub fn build_lines(config: &WatermarkConfig, display_time: &str) -> Vec<String> {
    let labels = &config.labels;
    let labelled = |label: &str, value: &str| format!("{}{}{}", label, labels.separator, value);

    let mut lines = Vec::with_capacity(3 + config.custom_items.len());

    if !config.area.is_empty() {
        lines.push(labelled(&labels.area, &config.area));
    }
    if !config.content.is_empty() {
        lines.push(labelled(&labels.content, &config.content));
    }

    lines.push(labelled(&labels.time, display_time));

    lines.extend(
        config
            .custom_items
            .iter()
            .filter(|item| !item.value.is_empty())
            .map(|item| labelled(&item.label, &item.value)),
    );

    lines
}
