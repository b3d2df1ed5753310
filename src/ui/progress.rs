use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::campaign::StatusReporter;
use crate::store::{Campaign, CampaignStatus, ContactRecord};

const CHECK: &str = "✓";
const CROSS: &str = "✗";

/// Terminal UI for a running campaign, rendered via `indicatif`.
///
/// Two bars are stacked vertically:
/// - Contact bar — tracks how many contacts have been processed
/// - Status bar — spinner with the current call's status line
pub struct CampaignUI {
    multi: MultiProgress,
    contact_bar: ProgressBar,
    status_bar: ProgressBar,
}

impl CampaignUI {
    pub fn new(total_contacts: u64) -> Self {
        let multi = MultiProgress::new();

        let contact_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let contact_bar = multi.add(ProgressBar::new(total_contacts));
        contact_bar.set_style(contact_style);
        contact_bar.set_prefix("Contacts");

        let status_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(status_style);
        status_bar.set_prefix("  Status");

        Self {
            multi,
            contact_bar,
            status_bar,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the
    /// rich UI fails, so call outcomes are never silently lost.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }
}

impl StatusReporter for CampaignUI {
    fn campaign_started(&self, campaign: &Campaign, total: usize) {
        self.contact_bar.set_length(total as u64);
        self.status_bar
            .set_message(format!("Starting campaign: {}", style(&campaign.name).yellow()));
        self.status_bar
            .enable_steady_tick(Duration::from_millis(100));
    }

    fn calling(&self, index: usize, total: usize, contact: &ContactRecord) {
        self.status_bar.set_message(format!(
            "Calling {} ({}/{})",
            style(&contact.full_name).cyan(),
            index,
            total
        ));
    }

    fn call_initiated(&self, contact: &ContactRecord) {
        self.contact_bar.inc(1);
        self.print_line(format!(
            "  {} Call initiated for {}",
            style(CHECK).green(),
            contact.full_name
        ));
    }

    fn call_failed(&self, contact: &ContactRecord, message: &str) {
        self.contact_bar.inc(1);
        self.print_line(format!(
            "  {} {}: {}",
            style(CROSS).red(),
            contact.full_name,
            style(message).dim()
        ));
    }

    fn contact_skipped(&self, contact: &ContactRecord) {
        self.contact_bar.inc(1);
        self.print_line(format!(
            "  {} {} already attempted, skipping",
            style("→").dim(),
            contact.full_name
        ));
    }

    fn campaign_finished(&self, campaign: &Campaign) {
        self.status_bar.disable_steady_tick();
        match campaign.status {
            CampaignStatus::Completed => {
                self.status_bar
                    .finish_with_message(style("Campaign completed").green().to_string());
            }
            CampaignStatus::Failed => {
                let reason = campaign.error.as_deref().unwrap_or("unknown error");
                self.status_bar.finish_with_message(format!(
                    "{} {}",
                    style("Campaign failed:").red(),
                    reason
                ));
            }
            CampaignStatus::Canceled => {
                self.status_bar
                    .finish_with_message(style("Campaign canceled").yellow().to_string());
            }
            _ => {
                self.status_bar.finish_with_message(format!(
                    "Campaign stopped ({})",
                    campaign.status
                ));
            }
        }
    }
}
