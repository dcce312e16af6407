use chrono::{DateTime, Utc};
use tempo_core::PlanEntry;

const ICS_TIME: &str = "%Y%m%dT%H%M%SZ";

/// Render plan entries as a minimal ICS calendar, one VEVENT per entry.
///
/// Times are UTC. UIDs combine task id and start time so re-exporting the same
/// plan updates events instead of duplicating them.
pub fn plan_to_ics(entries: &[PlanEntry], stamp: DateTime<Utc>) -> String {
    let mut s = String::new();
    s.push_str("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Tempo//Planner//EN\r\n");

    for e in entries {
        s.push_str("BEGIN:VEVENT\r\n");
        s.push_str(&format!("UID:{}-{}@tempo\r\n", e.task_id, e.start_time.format(ICS_TIME)));
        s.push_str(&format!("DTSTAMP:{}\r\n", stamp.format(ICS_TIME)));
        s.push_str(&format!("DTSTART:{}\r\n", e.start_time.format(ICS_TIME)));
        s.push_str(&format!("DTEND:{}\r\n", e.end_time.format(ICS_TIME)));
        s.push_str(&format!("SUMMARY:{}\r\n", escape_ics(&e.title)));
        let description = format!(
            "TaskId: {}\nPriority: {}\nStatus: {:?}\nMinutes: {}",
            e.task_id,
            e.priority.as_str(),
            e.status,
            e.duration_minutes
        );
        s.push_str(&format!("DESCRIPTION:{}\r\n", escape_ics(&description)));
        s.push_str("END:VEVENT\r\n");
    }

    s.push_str("END:VCALENDAR\r\n");
    s
}

fn escape_ics(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}
