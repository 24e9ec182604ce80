use std::fmt::Write;

use cep_core::{Mode, MipStatus, OptimizationResult, Provenance, RateSchedule, Termination};

pub fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Greedy => "greedy",
        Mode::Exact => "exact",
    }
}

pub fn schedule_label(schedule: RateSchedule) -> &'static str {
    match schedule {
        RateSchedule::TwoBranch => "two-branch",
        RateSchedule::ThreeBranch => "three-branch",
        RateSchedule::Coverage => "coverage",
    }
}

fn status_line(provenance: &Provenance) -> String {
    match provenance {
        Provenance::Greedy { steps, termination } => {
            let reason = match termination {
                Termination::Converged => "CONVERGED",
                Termination::TargetReached => "TARGET REACHED",
            };
            format!("{} after {} merges", reason, steps.len())
        }
        Provenance::Exact { status, nodes, .. } => {
            let status = match status {
                MipStatus::Optimal => "OPTIMAL",
                MipStatus::TimeLimit => "TIME LIMIT (best found)",
                MipStatus::NodeLimit => "NODE LIMIT (best found)",
            };
            format!("{} after {} nodes", status, nodes)
        }
    }
}

/// Plain-text report
pub fn render_pretty(result: &OptimizationResult) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    write_pretty(&mut out, result).map(|()| out)
}

fn write_pretty(out: &mut String, result: &OptimizationResult) -> std::fmt::Result {
    let schools: usize = result.groups.iter().map(|g| g.members.len()).sum();

    writeln!(out, "Mode: {}", mode_label(result.mode))?;
    writeln!(out, "Schedule: {}", schedule_label(result.schedule))?;
    writeln!(out, "Status: {}", status_line(&result.provenance))?;
    writeln!(out)?;
    writeln!(out, "Schools: {}  Groups: {}", schools, result.groups.len())?;
    writeln!(out, "Total enrollment: {}", result.total_enrollment)?;
    writeln!(out, "Total reimbursement: {:.2}", result.total_reimbursement)?;
    writeln!(out, "Overall rate: {:.4}", result.overall_rate)?;
    writeln!(
        out,
        "Baselines: all separate {:.2}, all together {:.2}",
        result.baselines.all_separate, result.baselines.all_together
    )?;
    writeln!(out)?;
    writeln!(out, "Groups:")?;

    for (i, group) in result.groups.iter().enumerate() {
        writeln!(
            out,
            "  {:>3}. {:>3} schools  ISP {:6.2}%  rate {:.4}  enrollment {:>7} ({:6.2}%)  reimbursement {:>12.2}  contribution {:.4}",
            i + 1,
            group.members.len(),
            group.weighted_isp * 100.0,
            group.reimbursement_rate,
            group.total_enrollment,
            group.enrollment_share * 100.0,
            group.reimbursement,
            group.rate_contribution,
        )?;
        writeln!(out, "       {}", group.school_names.join(", "))?;
    }

    Ok(())
}

pub fn render_json(result: &OptimizationResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cep_core::{School, optimize};

    fn result() -> OptimizationResult {
        let schools = vec![
            School::new("High", 100, 0.90),
            School::new("Mid", 100, 0.50),
        ];
        optimize(&schools, Mode::Greedy, None).unwrap()
    }

    #[test]
    fn test_pretty_report() {
        let text = render_pretty(&result()).unwrap();
        assert!(text.contains("Mode: greedy"));
        assert!(text.contains("Schedule: two-branch"));
        assert!(text.contains("Status: CONVERGED after 1 merges"));
        assert!(text.contains("Total reimbursement: 900.00"));
        assert!(text.contains("High, Mid"));
        assert!(text.contains("enrollment     200 (100.00%)"));
        assert!(text.contains("contribution 4.5000"));
    }

    #[test]
    fn test_group_shares() {
        let schools = vec![
            School::new("A", 100, 0.60),
            School::new("B", 300, 0.65),
        ];
        let result = optimize(&schools, Mode::Greedy, None).unwrap();
        let text = render_pretty(&result).unwrap();

        // Apart: 100·4.52 = 452 and 300·4.5 = 1350, over 400 students
        assert!(text.contains("enrollment     100 ( 25.00%)"));
        assert!(text.contains("enrollment     300 ( 75.00%)"));
        assert!(text.contains("contribution 1.1300"));
        assert!(text.contains("contribution 3.3750"));
    }

    #[test]
    fn test_json_report() {
        let json = render_json(&result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "Greedy");
        assert_eq!(value["total_enrollment"], 200);
        assert_eq!(value["groups"][0]["school_names"][1], "Mid");
        assert_eq!(value["groups"][0]["enrollment_share"], 1.0);
        assert_eq!(value["groups"][0]["rate_contribution"], 4.5);
    }
}
