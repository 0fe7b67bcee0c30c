mod clean_host;
mod failure_handling;
mod health_policy;
mod indeterminate_check;
mod pipeline_timeout;
mod rerun;
