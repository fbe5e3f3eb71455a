use crate::cmd::{parse_at, ScheduleArgs};
use crate::output::print_json;

/// Print the next `count` runs of a schedule after `from`, chaining each
/// run off the previous one the way recorded outcomes do.
pub fn run(schedule: ScheduleArgs, from: Option<&str>, count: u16, json: bool) -> anyhow::Result<()> {
    let descriptor = schedule.require_descriptor()?;
    let parsed = descriptor.validate()?;
    let mut reference = parse_at(from)?;

    let mut runs = Vec::new();
    for _ in 0..count {
        match parsed.next_after(reference) {
            Some(next) => {
                runs.push(next);
                reference = next;
            }
            None => break,
        }
    }

    if json {
        print_json(&serde_json::json!({
            "schedule": descriptor,
            "description": parsed.to_string(),
            "runs": runs,
        }))?;
        return Ok(());
    }

    println!("Schedule: {parsed}");
    if runs.is_empty() {
        println!("No future run.");
    }
    for next in runs {
        println!("  {}", next.to_rfc3339());
    }
    Ok(())
}
