//! # Host Flow
//!
//! The full host: one [`HostContext`] with its server and worker buses,
//! driven through [`HostActivity`] callbacks.
//!
//! ```text
//!   created ──► both buses SERVING, browser at base URL
//!   stopped ──► path saved, server IDLE, worker still SERVING
//!   resumed ──► server SERVING again, browser at base URL + saved path
//!   destroyed ► worker EXITED, server EXITED
//! ```
//!
//! [`HostContext`]: host_runtime::HostContext
//! [`HostActivity`]: host_runtime::HostActivity

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use ch_05_worker_pool::JobState;
    use ch_06_host_bridge::testing::{HostCall, RecordingHostAdapter, RecordingNotifier};
    use host_runtime::adapters::default_runners;
    use host_runtime::{HostActivity, HostConfig, HostContext};
    use shared_types::{keys, LifecycleState};

    use crate::integration::support::wait_until;

    struct Host {
        activity: HostActivity,
        adapter: Arc<RecordingHostAdapter>,
        notifier: Arc<RecordingNotifier>,
    }

    fn host(home: &Path) -> Host {
        let mut config = HostConfig::default();
        config.paths.home = home.to_path_buf();
        config.server.zeroconf = false;
        let adapter = Arc::new(RecordingHostAdapter::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let context =
            HostContext::new(config, adapter.clone(), notifier.clone(), default_runners())
                .unwrap();
        Host {
            activity: HostActivity::new(Arc::new(context)),
            adapter,
            notifier,
        }
    }

    #[test]
    fn test_activity_cycle_across_both_buses() {
        let home = tempfile::tempdir().unwrap();
        let host = host(home.path());
        let context = Arc::clone(host.activity.context());

        // created
        let outcome = host.activity.on_created().unwrap().join();
        let first = outcome.server.unwrap();
        outcome.worker.unwrap();
        assert_eq!(
            host.adapter.last_replaced().unwrap(),
            format!("http://127.0.0.1:{}/", first.port)
        );
        let key = context.server().session_key().unwrap();
        assert!(host.adapter.calls().contains(&HostCall::Cookie {
            url: "http://127.0.0.1/".to_string(),
            key: key.as_str().to_string(),
        }));

        // stopped
        host.adapter
            .navigate(format!("http://127.0.0.1:{}/library/item?id=42", first.port));
        host.activity.on_stopped();
        host.activity.on_save_instance_state();
        wait_until("server IDLE", || {
            context.server().current_state() == LifecycleState::Idle
        });
        assert_eq!(
            context.store().get(keys::SAVED_PATH).unwrap().as_deref(),
            Some("/library/item?id=42")
        );

        // the worker bus keeps processing while the server is down
        assert_eq!(context.worker().current_state(), LifecycleState::Serving);
        let job = context.submit_job("ping", serde_json::json!({})).unwrap();
        wait_until("ping job", || {
            context.jobs().get(&job).is_some_and(|j| j.state == JobState::Done)
        });

        // resumed
        host.activity.on_resumed();
        wait_until("redirect to saved path", || {
            host.adapter
                .last_replaced()
                .is_some_and(|url| url.ends_with("/library/item?id=42"))
        });
        assert_eq!(context.server().current_state(), LifecycleState::Serving);
        let port = context.server().bound_port().unwrap();
        assert!(context
            .server()
            .is_service_url(&format!("http://127.0.0.1:{port}/library/item?id=42")));

        // destroyed
        host.activity.on_destroyed().unwrap();
        assert_eq!(context.server().current_state(), LifecycleState::Exited);
        assert_eq!(context.worker().current_state(), LifecycleState::Exited);
        assert_eq!(host.notifier.foregrounded(), 2);
        assert_eq!(host.notifier.released(), 2);
    }

    #[test]
    fn test_session_key_and_saved_path_survive_restart() {
        let home = tempfile::tempdir().unwrap();
        let key = {
            let host = host(home.path());
            let port = host.activity.on_created().unwrap().join().server.unwrap().port;
            host.adapter
                .navigate(format!("http://127.0.0.1:{port}/reader#chapter-3"));
            host.activity.on_save_instance_state();
            host.activity.on_destroyed().unwrap();
            host.activity.context().server().session_key().unwrap()
        };

        let host = host(home.path());
        let context = Arc::clone(host.activity.context());
        let next = host.activity.on_created().unwrap().join().server.unwrap();

        assert_eq!(context.server().session_key().unwrap(), key);
        assert_eq!(
            host.adapter.last_replaced().unwrap(),
            format!("http://127.0.0.1:{}/reader#chapter-3", next.port)
        );
        assert_ne!(next.port, 0);
    }

    #[test]
    fn test_resume_while_serving_is_ignored() {
        let home = tempfile::tempdir().unwrap();
        let host = host(home.path());

        host.activity.on_resumed();
        wait_until("server SERVING", || {
            host.activity.context().server().current_state() == LifecycleState::Serving
        });
        host.activity.on_resumed();

        assert_eq!(
            host.adapter
                .calls()
                .iter()
                .filter(|call| **call == HostCall::Loading)
                .count(),
            1
        );
    }
}
