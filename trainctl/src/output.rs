use anyhow::Result;
use clap::ValueEnum;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use model::view::job::JobRow;
use model::view::node::{NodeGpuPodRow, NodeRow};
use serde::Serialize;

const KI: f64 = 1024.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Table with every column
    Wide,
    Json,
    Yaml,
}

/// Types printed as table rows or as key-value details.
pub trait Formattable {
    fn table_headers(wide: bool) -> Vec<&'static str>;
    fn table_row(&self, wide: bool) -> Vec<String>;
    fn key_value_pairs(&self) -> Vec<(&'static str, String)>;
}

/// GPU counts, without trailing zeros.
pub fn fmt_gpus(gpus: f64) -> String {
    let rendered = format!("{gpus:.2}");
    rendered.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Bytes in the largest binary unit keeping the value above one.
pub fn fmt_bytes(bytes: f64) -> String {
    let units = ["", "Ki", "Mi", "Gi", "Ti", "Pi"];
    let mut value = bytes;
    let mut unit = 0;
    while value.abs() >= KI && unit < units.len() - 1 {
        value /= KI;
        unit += 1;
    }
    format!("{}{}", fmt_gpus(value), units[unit])
}

impl Formattable for NodeRow {
    fn table_headers(wide: bool) -> Vec<&'static str> {
        let mut headers = vec![
            "NAME",
            "STATUS",
            "IP",
            "GPUs",
            "ALLOCATED GPUs",
            "CPUs",
            "ALLOCATED CPUs",
            "MEMORY",
            "ALLOCATED MEMORY",
        ];
        if wide {
            headers.extend([
                "ROLE",
                "UNHEALTHY GPUs",
                "USED GPUs",
                "GPU MEMORY",
                "USED GPU MEMORY",
                "USED CPUs",
                "USED MEMORY",
            ]);
        }
        headers
    }

    fn table_row(&self, wide: bool) -> Vec<String> {
        let mut row = vec![
            self.name.clone(),
            self.status.to_string(),
            self.ip_address.clone(),
            fmt_gpus(self.gpu.capacity),
            fmt_gpus(self.gpu.allocated_fraction),
            fmt_gpus(self.cpu.capacity),
            fmt_gpus(self.cpu.requested),
            fmt_bytes(self.memory.capacity),
            fmt_bytes(self.memory.requested),
        ];
        if wide {
            row.extend([
                self.role.clone(),
                fmt_gpus(self.gpu.unhealthy),
                fmt_gpus(self.gpu.usage),
                fmt_bytes(self.gpu_memory.capacity),
                fmt_bytes(self.gpu_memory.usage),
                fmt_gpus(self.cpu.usage),
                fmt_bytes(self.memory.usage),
            ]);
        }
        row
    }

    fn key_value_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Status", self.status.to_string()),
            ("Role", self.role.clone()),
            ("IP", self.ip_address.clone()),
            ("GPUs", fmt_gpus(self.gpu.capacity)),
            ("Allocatable GPUs", fmt_gpus(self.gpu.allocatable)),
            ("Unhealthy GPUs", fmt_gpus(self.gpu.unhealthy)),
            ("Allocated GPUs", fmt_gpus(self.gpu.allocated_fraction)),
            ("Allocated GPU units", fmt_gpus(self.gpu.allocated_units)),
            ("Used GPUs", fmt_gpus(self.gpu.usage)),
            ("GPU memory", fmt_bytes(self.gpu_memory.capacity)),
            ("Used GPU memory", fmt_bytes(self.gpu_memory.usage)),
            ("CPUs", fmt_gpus(self.cpu.capacity)),
            ("Allocatable CPUs", fmt_gpus(self.cpu.allocatable)),
            ("Allocated CPUs", fmt_gpus(self.cpu.requested)),
            ("Used CPUs", fmt_gpus(self.cpu.usage)),
            ("Memory", fmt_bytes(self.memory.capacity)),
            ("Allocatable memory", fmt_bytes(self.memory.allocatable)),
            ("Allocated memory", fmt_bytes(self.memory.requested)),
            ("Used memory", fmt_bytes(self.memory.usage)),
        ]
    }
}

impl Formattable for JobRow {
    fn table_headers(wide: bool) -> Vec<&'static str> {
        let mut headers = vec![
            "NAME", "STATUS", "AGE", "NODE", "IMAGE", "TYPE", "PROJECT", "USER",
            "GPUs Allocated (Requested)",
        ];
        if wide {
            headers.extend([
                "NAMESPACE",
                "DURATION",
                "PODS Running (Pending)",
                "POD GROUP",
            ]);
        }
        headers
    }

    fn table_row(&self, wide: bool) -> Vec<String> {
        let mut row = vec![
            self.name.clone(),
            self.status.to_string(),
            self.age.clone(),
            self.node.clone(),
            self.image.clone(),
            self.kind.clone(),
            self.project.clone(),
            self.user.clone(),
            format!(
                "{} ({})",
                fmt_gpus(self.allocated_gpus),
                fmt_gpus(self.requested_gpus)
            ),
        ];
        if wide {
            row.extend([
                self.namespace.clone(),
                self.duration.clone(),
                format!("{} ({})", self.running_pods, self.pending_pods),
                self.pod_group.clone(),
            ]);
        }
        row
    }

    fn key_value_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Namespace", self.namespace.clone()),
            ("Type", self.kind.clone()),
            ("Status", self.status.to_string()),
            ("Age", self.age.clone()),
            ("Duration", self.duration.clone()),
            ("Node", self.node.clone()),
            ("Image", self.image.clone()),
            ("Project", self.project.clone()),
            ("User", self.user.clone()),
            ("Requested GPUs", fmt_gpus(self.requested_gpus)),
            ("Allocated GPUs", fmt_gpus(self.allocated_gpus)),
            ("Running pods", self.running_pods.to_string()),
            ("Pending pods", self.pending_pods.to_string()),
            ("Pod group", self.pod_group.clone()),
        ]
    }
}

impl Formattable for NodeGpuPodRow {
    fn table_headers(_wide: bool) -> Vec<&'static str> {
        vec!["POD", "NAMESPACE", "PHASE", "REQUESTED GPUs", "ALLOCATED GPUs"]
    }

    fn table_row(&self, _wide: bool) -> Vec<String> {
        vec![
            self.name.clone(),
            self.namespace.clone(),
            self.phase.clone(),
            fmt_gpus(self.requested_gpus),
            fmt_gpus(self.allocated_gpus),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Pod", self.name.clone()),
            ("Namespace", self.namespace.clone()),
            ("Phase", self.phase.clone()),
            ("Requested GPUs", fmt_gpus(self.requested_gpus)),
            ("Allocated GPUs", fmt_gpus(self.allocated_gpus)),
        ]
    }
}

/// Renders views in the format picked on the command line.
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self { Self { format } }

    /// Serializes `value` for the machine readable formats, `None` for
    /// tables.
    pub fn render_value<T: Serialize>(&self, value: &T) -> Result<Option<String>> {
        Ok(match self.format {
            OutputFormat::Json => Some(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
            OutputFormat::Table | OutputFormat::Wide => None,
        })
    }

    pub fn render_item<T>(&self, item: &T) -> Result<String>
    where
        T: Serialize + Formattable,
    {
        if let Some(rendered) = self.render_value(item)? {
            return Ok(rendered);
        }
        let pairs = item.key_value_pairs();
        let width =
            pairs.iter().map(|(key, _)| key.len() + 1).max().unwrap_or_default();
        Ok(pairs
            .into_iter()
            .map(|(key, value)| format!("{:<width$}  {value}", format!("{key}:")))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub fn render_list<T>(&self, items: &[T]) -> Result<String>
    where
        T: Serialize + Formattable,
    {
        if let Some(rendered) = self.render_value(&items)? {
            return Ok(rendered);
        }
        if items.is_empty() {
            return Ok("No resources found".to_string());
        }

        let wide = self.format == OutputFormat::Wide;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(T::table_headers(wide).into_iter().map(|header| {
                Cell::new(header).add_attribute(Attribute::Bold).fg(Color::Cyan)
            }));
        for item in items {
            table.add_row(item.table_row(wide));
        }
        Ok(table.to_string())
    }

    pub fn print_item<T>(&self, item: &T) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        println!("{}", self.render_item(item)?);
        Ok(())
    }

    pub fn print_list<T>(&self, items: &[T]) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        println!("{}", self.render_list(items)?);
        Ok(())
    }
}
