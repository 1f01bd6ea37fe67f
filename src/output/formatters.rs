use serde_json::json;

use crate::config::OutputFormat;
use crate::devices::SlaveData;
use crate::services::DeviceSnapshot;

pub trait SnapshotFormatter: Send + Sync {
    fn format_snapshot(&self, snapshot: &DeviceSnapshot) -> String;
    fn format_readings(&self, data: &SlaveData) -> String;
}

pub fn formatter_for(format: OutputFormat) -> Box<dyn SnapshotFormatter> {
    match format {
        OutputFormat::Console => Box::new(ConsoleFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Labelled sections in the layout of the operator panel.
pub struct ConsoleFormatter;

impl SnapshotFormatter for ConsoleFormatter {
    fn format_snapshot(&self, snapshot: &DeviceSnapshot) -> String {
        let mut output = String::new();

        let status = if snapshot.connect_busy {
            format!("{} ...", snapshot.status)
        } else {
            snapshot.status.to_string()
        };
        output.push_str(&format!("Slave {} [{}]\n", snapshot.ip_address, status));

        if let Some(notice) = snapshot.connect_failure_notice() {
            output.push_str(&format!("⚠️  {} (type 'ack' to dismiss)\n", notice));
        }

        output.push_str(&"═".repeat(40));
        output.push('\n');
        output.push_str(&self.format_readings(&snapshot.data));

        if let Some(updated_at) = snapshot.updated_at {
            output.push_str(&format!(
                "\nLast update: {} (#{})\n",
                updated_at.format("%Y-%m-%d %H:%M:%S"),
                snapshot.poll_count
            ));
        }
        output
    }

    fn format_readings(&self, data: &SlaveData) -> String {
        let views = data.diag_views();
        let mut output = String::new();

        output.push_str(&format!("Firmware build: {}\n", data.firmware_label()));
        output.push_str("Voltages\n");
        output.push_str(&format!("  Servo Power: {:.2} Volts\n", data.servo_voltage));
        output.push_str(&format!("  Actuator Power: {:.2} Volts\n", data.actuator_voltage));
        output.push_str("Diagnose Flags\n");
        for line in views.to_string().lines() {
            output.push_str("  ");
            output.push_str(line);
            output.push('\n');
        }
        output
    }
}

pub struct JsonFormatter;

impl SnapshotFormatter for JsonFormatter {
    fn format_snapshot(&self, snapshot: &DeviceSnapshot) -> String {
        let value = json!({
            "ip_address": snapshot.ip_address,
            "target_address": snapshot.target_address,
            "status": snapshot.status,
            "connect_busy": snapshot.connect_busy,
            "last_connect_failed": snapshot.last_connect_failed,
            "readings": snapshot.data,
            "diag_views": snapshot.diag_views(),
            "updated_at": snapshot.updated_at,
            "poll_count": snapshot.poll_count,
        });
        value.to_string()
    }

    fn format_readings(&self, data: &SlaveData) -> String {
        json!({
            "readings": data,
            "diag_views": data.diag_views(),
        })
        .to_string()
    }
}
