//! Scenario lifecycle tests against the in-memory control plane

mod common;
use common::helpers::RunBuilder;
use common::{FakeArm, FakeSite, TestFixtures};

use azure::web_apps::STARTUP_COMMAND_SETTING;
use azure::{ActivityEvent, AppLogs, AppSettingsMutator, AzureError, HealthProbe, MetricPoint};
use chrono::Utc;
use serde_json::json;
use shared::{AppSettings, ProbeExpectation, TimingConfig, site_url};
use std::time::{Duration, Instant};
use tester::driver::{self, Phase};
use tester::{ScenarioContext, ScenarioKind, TesterError, scenarios};

/// Test that noenvvar leaves the settings map exactly as it found it
#[tokio::test]
async fn test_noenvvar_recover_restores_settings() {
    // Arrange
    let site = TestFixtures::scenario_site("noenvvar");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();

    // Act
    let report = driver::run_scenario(run, scenarios::find("noenvvar").unwrap()).await;

    // Assert
    assert!(report.passed(), "failed: {:?}", report.failure);
    assert_eq!(arm.settings(&site), before);
    assert_eq!(report.app, "noenvvar-unit");
}

/// Test that every setting-based scenario restores the original map
#[tokio::test]
async fn test_setting_scenarios_restore_original_map() {
    for name in ["noconn", "badconn", "badentry"] {
        let site = TestFixtures::scenario_site(name);
        let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
        let before = arm.settings(&site);
        let zips = TestFixtures::zip_dir(false);
        let run = RunBuilder::new(arm.clone(), zips.path()).build();
        let def = scenarios::find(name).unwrap();

        let mut ctx = ScenarioContext::new(run, def.kind);
        (def.phases.setup)(&mut ctx).await.unwrap();
        assert_ne!(arm.settings(&site), before, "{name} setup changed nothing");
        (def.phases.recover)(&mut ctx).await.unwrap();

        assert_eq!(arm.settings(&site), before, "{name} did not restore the map");
    }
}

/// Test that removing an absent setting fails fast without writing
#[tokio::test]
async fn test_setup_fails_fast_when_setting_absent() {
    let site = TestFixtures::scenario_site("noenvvar");
    let arm = FakeArm::new().with_settings(&site, &[("DATABASE_URL", TestFixtures::DATABASE_URL)]);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("noenvvar").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    let error = (def.phases.setup)(&mut ctx).await.unwrap_err();

    assert!(
        matches!(error, TesterError::Azure(AzureError::SettingMissing { ref key }) if key == "SECRET_KEY"),
        "unexpected error {error:?}"
    );
    assert!(!arm.called("PUT", "/config/appsettings"));
}

/// Test that badconn setup fails when DATABASE_URL is missing
#[tokio::test]
async fn test_badconn_requires_database_url() {
    let site = TestFixtures::scenario_site("badconn");
    let arm = FakeArm::new().with_settings(&site, &[("SECRET_KEY", TestFixtures::SECRET)]);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm, zips.path()).build();
    let def = scenarios::find("badconn").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    let error = (def.phases.setup)(&mut ctx).await.unwrap_err();

    assert!(matches!(error, TesterError::SetupFailed { .. }));
}

/// Test the SECRET_KEY remove/restore round trip as seen through the app
#[tokio::test]
async fn test_secret_key_round_trip_end_to_end() {
    let resources = TestFixtures::resources();
    let app = resources.scenario_app_name("noenvvar");
    let site = resources.site_id(&app);
    let arm = FakeArm::new().with_settings(&site, &[("SECRET_KEY", TestFixtures::SECRET)]);
    let probe = FakeSite::new(arm.clone(), resources);
    let settings = AppSettingsMutator::new(&arm, site.as_str());
    let url = site_url(&app);

    let removed = settings.remove("SECRET_KEY").await.unwrap();
    let broken = probe.get(&url, Duration::from_secs(5)).await;
    assert!(broken.check(ProbeExpectation::Broken).is_ok());
    assert_eq!(broken.app_value(), None);

    settings.set("SECRET_KEY", &removed).await.unwrap();
    let healthy = probe.get(&url, Duration::from_secs(5)).await;
    assert!(healthy.expect_app_value(TestFixtures::SECRET).is_ok());
}

/// Test that removing and re-adding a key gives back the same map
#[tokio::test]
async fn test_settings_map_round_trip() {
    let site = TestFixtures::scenario_site("badconn");
    let arm = FakeArm::new().with_settings(&site, &[("A", "1"), ("B", "2")]);
    let settings = AppSettingsMutator::new(&arm, site.as_str());

    settings.remove("A").await.unwrap();
    let without_a: AppSettings = [("B", "2")].into_iter().collect();
    assert_eq!(settings.list().await.unwrap(), without_a);

    settings.set("A", "1").await.unwrap();
    let restored: AppSettings = [("A", "1"), ("B", "2")].into_iter().collect();
    assert_eq!(settings.list().await.unwrap(), restored);
}

/// Test that the driver stops at the first failing phase
#[tokio::test]
async fn test_driver_aborts_on_phase_error() {
    // App starts broken, so prevalidate fails
    let site = TestFixtures::scenario_site("noenvvar");
    let arm = FakeArm::new().with_settings(&site, &[("DATABASE_URL", TestFixtures::DATABASE_URL)]);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();

    let report = driver::run_scenario(run, scenarios::find("noenvvar").unwrap()).await;

    let failure = report.failure.expect("scenario should fail");
    assert_eq!(failure.phase, Phase::Prevalidate);
    assert!(!arm.called("PUT", "/config/appsettings"));
}

/// Test that one failing scenario does not stop the batch
#[tokio::test]
async fn test_batch_continues_after_failure() {
    let arm = FakeArm::new().with_settings(&TestFixtures::scenario_site("badwrite"), &TestFixtures::healthy_settings());
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm, zips.path()).build();
    let selected = [scenarios::find("noenvvar").unwrap(), scenarios::find("badwrite").unwrap()];

    let summary = driver::run_batch(run, &selected).await;

    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.passed(), 1);
    assert_eq!(summary.failed()[0].name, "noenvvar");
    assert!(summary.reports[1].passed());
    assert!(!summary.all_passed());
}

/// Test that badpaths expects a 404 on /products and restores the flag
#[tokio::test]
async fn test_badpaths_full_lifecycle() {
    let site = TestFixtures::scenario_site("badpaths");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();

    let report = driver::run_scenario(run, scenarios::find("badpaths").unwrap()).await;

    assert!(report.passed(), "failed: {:?}", report.failure);
    assert_eq!(arm.settings(&site).get("PRODUCTS_ENABLED"), Some("1"));
    assert_eq!(arm.count("POST", "/sites/badpaths-unit/restart"), 2);
}

/// Test that simulated scenarios set and then clear their marker
#[tokio::test]
async fn test_simulated_scenario_marker_lifecycle() {
    let site = TestFixtures::scenario_site("sqlreject");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("sqlreject").unwrap();
    let marker = ScenarioKind::SqlReject.marker().unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    assert_eq!(arm.settings(&site).get(marker), Some("true"));
    (def.phases.validate)(&mut ctx).await.unwrap();
    (def.phases.recover)(&mut ctx).await.unwrap();
    assert!(!arm.settings(&site).contains(marker));
    (def.phases.finalize)(&mut ctx).await.unwrap();
}

/// Test that auto-heal validation needs restart events in the activity log
#[tokio::test]
async fn test_autoheal_validate_counts_restarts() {
    let zips = TestFixtures::zip_dir(false);
    let def = scenarios::find("autoheal").unwrap();

    let quiet = RunBuilder::new(FakeArm::new(), zips.path()).build();
    let mut ctx = ScenarioContext::new(quiet, def.kind);
    let error = (def.phases.validate)(&mut ctx).await.unwrap_err();
    assert!(matches!(error, TesterError::ValidationFailed { .. }));

    let restarted = RunBuilder::new(FakeArm::new(), zips.path())
        .with_monitor(|monitor| {
            monitor
                .expect_restart_events()
                .withf(|resource, minutes| resource.ends_with("/sites/autoheal-unit") && *minutes == 10)
                .returning(|_, _| {
                    Ok(vec![ActivityEvent {
                        timestamp: "2026-01-01T00:00:00Z".to_string(),
                        operation: "Microsoft.Web/sites/restart/Action".to_string(),
                        sub_status: None,
                    }])
                })
                .times(1);
        })
        .build();
    let mut ctx = ScenarioContext::new(restarted, def.kind);
    (def.phases.validate)(&mut ctx).await.unwrap();
}

/// Test that auto-heal setup patches site config and recovery disables it
#[tokio::test]
async fn test_autoheal_configures_and_disables_rules() {
    let site = TestFixtures::scenario_site("autoheal");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("autoheal").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    (def.phases.recover)(&mut ctx).await.unwrap();

    assert_eq!(arm.count("PATCH", "/sites/autoheal-unit/config/web"), 2);
    assert!(!arm.settings(&site).contains("_SCENARIO_AUTOHEAL_MEMORY_ENABLED"));
}

/// Test that brokenzip refuses to run without its package
#[tokio::test]
async fn test_brokenzip_requires_truncated_package() {
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(FakeArm::new(), zips.path())
        .with_deployer(|deployer| {
            deployer.expect_deploy().times(0);
        })
        .build();
    let def = scenarios::find("brokenzip").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    let error = (def.phases.setup)(&mut ctx).await.unwrap_err();

    assert!(matches!(error, TesterError::PackageMissing { ref path } if path.ends_with("SampleMarketingAppTruncated.zip")));
}

/// Test that brokenzip deploys the truncated then the good package to production
#[tokio::test]
async fn test_brokenzip_deploys_both_packages() {
    let zips = TestFixtures::zip_dir(true);
    let run = RunBuilder::new(FakeArm::new(), zips.path())
        .with_deployer(|deployer| {
            deployer
                .expect_deploy()
                .withf(|target, package| {
                    target.app == "brokenzip-unit"
                        && target.slot.is_none()
                        && package.ends_with("SampleMarketingAppTruncated.zip")
                })
                .returning(|_, _| Ok(()))
                .times(1);
            deployer
                .expect_deploy()
                .withf(|_, package| package.ends_with("SampleMarketingApp.zip"))
                .returning(|_, _| Ok(()))
                .times(1);
        })
        .build();
    let def = scenarios::find("brokenzip").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    (def.phases.recover)(&mut ctx).await.unwrap();
}

/// Test that cold start scales out, samples and scales back
#[tokio::test]
async fn test_coldstart_scales_out_and_back() {
    let resources = TestFixtures::resources();
    let site = TestFixtures::scenario_site("coldstart");
    let arm = FakeArm::new()
        .with_settings(&site, &TestFixtures::healthy_settings())
        .with_document(
            &resources.plan_id(),
            json!({ "sku": { "name": "S1", "tier": "Standard", "size": "S1", "family": "S", "capacity": 1 } }),
        );
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("coldstart").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    assert_eq!(ctx.saved.plan_capacity, Some(1));
    (def.phases.validate)(&mut ctx).await.unwrap();
    (def.phases.recover)(&mut ctx).await.unwrap();

    assert_eq!(arm.count("PATCH", "/serverfarms/asp-unit"), 2);
    assert!(arm.called("PATCH", "/sites/coldstart-unit"));
}

const GOOD_STARTUP_COMMAND: &str = "gunicorn --bind=0.0.0.0 --timeout 600 app:app";

/// Test that badstartcmd recovery prefers the staging slot's startup command
#[tokio::test]
async fn test_badstartcmd_recover_uses_staging_command() {
    let site = TestFixtures::scenario_site("badstartcmd");
    let arm = FakeArm::new()
        .with_settings(&site, &TestFixtures::healthy_settings())
        .with_settings(
            &format!("{site}/slots/staging"),
            &[(STARTUP_COMMAND_SETTING, GOOD_STARTUP_COMMAND)],
        );
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("badstartcmd").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    assert_eq!(arm.settings(&site).get(STARTUP_COMMAND_SETTING), Some("bogus_command_line"));
    (def.phases.recover)(&mut ctx).await.unwrap();

    let mut expected = before;
    expected.set(STARTUP_COMMAND_SETTING, GOOD_STARTUP_COMMAND);
    assert_eq!(arm.settings(&site), expected);
    assert_eq!(arm.count("POST", "/sites/badstartcmd-unit/restart"), 1);
}

/// Test that badstartcmd puts back the saved command, or removes the override
#[tokio::test]
async fn test_badstartcmd_recover_without_staging_restores_map() {
    let mut with_command = TestFixtures::healthy_settings();
    with_command.push((STARTUP_COMMAND_SETTING, "python app.py"));

    for initial in [with_command, TestFixtures::healthy_settings()] {
        let site = TestFixtures::scenario_site("badstartcmd");
        let arm = FakeArm::new().with_settings(&site, &initial);
        let before = arm.settings(&site);
        let zips = TestFixtures::zip_dir(false);
        let run = RunBuilder::new(arm.clone(), zips.path()).build();
        let def = scenarios::find("badstartcmd").unwrap();

        let mut ctx = ScenarioContext::new(run, def.kind);
        (def.phases.setup)(&mut ctx).await.unwrap();
        (def.phases.recover)(&mut ctx).await.unwrap();

        assert_eq!(arm.settings(&site), before);
    }
}

/// Test that a confirmed startup failure that persists fails recovery after one settle
#[tokio::test]
async fn test_badstartcmd_recover_reports_persistent_failure() {
    // Without SECRET_KEY the app keeps answering 500
    let site = TestFixtures::scenario_site("badstartcmd");
    let arm = FakeArm::new().with_settings(&site, &[("DATABASE_URL", TestFixtures::DATABASE_URL)]);
    let zips = TestFixtures::zip_dir(false);
    let settle = Duration::from_millis(300);
    let run = RunBuilder::new(arm.clone(), zips.path())
        .with_timing(TimingConfig {
            settle,
            ..TimingConfig::immediate()
        })
        .with_monitor(|monitor| {
            monitor
                .expect_application_logs()
                .returning(|_, _| {
                    Ok(AppLogs {
                        console: vec!["/opt/startup/startup.sh: bogus_command_line: command not found".to_string()],
                    })
                })
                .times(1);
        })
        .build();
    let def = scenarios::find("badstartcmd").unwrap();
    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();

    let started = Instant::now();
    let error = (def.phases.recover)(&mut ctx).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(error, TesterError::RecoveryFailed { .. }), "unexpected error {error:?}");
    assert!(elapsed < settle * 2 - Duration::from_millis(50), "waited {elapsed:?}");
    assert!(!arm.settings(&site).contains(STARTUP_COMMAND_SETTING));
}

/// Test that vnetbreak saves the integration, deletes it and puts it back
#[tokio::test]
async fn test_vnetbreak_restores_saved_integration() {
    let resources = TestFixtures::resources();
    let site = TestFixtures::scenario_site("vnetbreak");
    let integration = format!("{site}/networkConfig/virtualNetwork");
    let subnet = resources.subnet_id(shared::APP_SUBNET);
    let arm = FakeArm::new()
        .with_settings(&site, &TestFixtures::healthy_settings())
        .with_document(
            &integration,
            json!({
                "etag": "W/\"1\"",
                "properties": {
                    "subnetResourceId": subnet,
                    "swiftSupported": true,
                    "provisioningState": "Succeeded"
                }
            }),
        );
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("vnetbreak").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    assert!(arm.called("DELETE", "/networkConfig/virtualNetwork"));
    assert_eq!(arm.document(&integration), None);
    (def.phases.recover)(&mut ctx).await.unwrap();

    assert_eq!(
        arm.document(&integration),
        Some(json!({ "properties": { "subnetResourceId": subnet, "swiftSupported": true } }))
    );
    assert_eq!(arm.settings(&site), before);
    assert_eq!(arm.count("POST", "/sites/vnetbreak-unit/restart"), 2);
}

/// Test that vnetbreak falls back to its marker and reconnects to the app subnet
#[tokio::test]
async fn test_vnetbreak_marker_fallback_reconnects_subnet() {
    let resources = TestFixtures::resources();
    let site = TestFixtures::scenario_site("vnetbreak");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();

    let report = driver::run_scenario(run, scenarios::find("vnetbreak").unwrap()).await;

    assert!(report.passed(), "failed: {:?}", report.failure);
    let puts = arm.bodies("PUT", "/networkConfig/virtualNetwork");
    assert_eq!(puts.len(), 1);
    assert_eq!(
        puts[0]["properties"]["subnetResourceId"],
        json!(resources.subnet_id(shared::APP_SUBNET))
    );
    assert_eq!(arm.settings(&site), before);
}

/// Test that baddns sets a custom resolver and then drops dhcpOptions
#[tokio::test]
async fn test_baddns_restores_vnet_dns() {
    let resources = TestFixtures::resources();
    let site = TestFixtures::scenario_site("baddns");
    let vnet = resources.vnet_id();
    let arm = FakeArm::new()
        .with_settings(&site, &TestFixtures::healthy_settings())
        .with_document(
            &vnet,
            json!({
                "etag": "W/\"7\"",
                "location": "brazilsouth",
                "properties": {
                    "provisioningState": "Succeeded",
                    "addressSpace": { "addressPrefixes": ["10.0.0.0/16"] }
                }
            }),
        );
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("baddns").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    (def.phases.recover)(&mut ctx).await.unwrap();

    let puts = arm.bodies("PUT", "/virtualNetworks/vnet-unit");
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0]["properties"]["dhcpOptions"]["dnsServers"], json!(["1.1.1.1"]));
    assert_eq!(
        arm.document(&vnet),
        Some(json!({
            "location": "brazilsouth",
            "properties": { "addressSpace": { "addressPrefixes": ["10.0.0.0/16"] } }
        }))
    );
    assert_eq!(arm.settings(&site), before);
}

/// Test that baddns runs end to end on its marker when the VNet update is refused
#[tokio::test]
async fn test_baddns_marker_fallback_lifecycle() {
    let resources = TestFixtures::resources();
    let site = TestFixtures::scenario_site("baddns");
    let arm = FakeArm::new()
        .with_settings(&site, &TestFixtures::healthy_settings())
        .with_document(&resources.vnet_id(), json!({ "properties": {} }))
        .rejecting("PUT", "/virtualNetworks/vnet-unit");
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();

    let report = driver::run_scenario(run, scenarios::find("baddns").unwrap()).await;

    assert!(report.passed(), "failed: {:?}", report.failure);
    assert_eq!(arm.settings(&site), before);
}

fn elevated(value: f64) -> Vec<MetricPoint> {
    vec![MetricPoint {
        timestamp: Utc::now(),
        value,
    }]
}

/// Test that highmem restarts the app when the memory metric crosses its threshold
#[tokio::test]
async fn test_highmem_restarts_on_metric_evidence() {
    let site = TestFixtures::scenario_site("highmem");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path())
        .with_monitor(|monitor| {
            monitor
                .expect_metric()
                .withf(|resource, metric, _| resource.ends_with("/sites/highmem-unit") && metric == "MemoryPercentage")
                .returning(|_, _, _| Ok(elevated(92.0)))
                .times(2);
        })
        .build();
    let def = scenarios::find("highmem").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    (def.phases.recover)(&mut ctx).await.unwrap();

    assert_eq!(arm.count("POST", "/sites/highmem-unit/restart"), 1);
}

/// Test that highcpu falls back to console logs for evidence
#[tokio::test]
async fn test_highcpu_restarts_on_log_evidence() {
    let site = TestFixtures::scenario_site("highcpu");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path())
        .with_monitor(|monitor| {
            monitor.expect_metric().returning(|_, _, _| Ok(elevated(12.0))).times(2);
            monitor
                .expect_application_logs()
                .returning(|_, _| {
                    Ok(AppLogs {
                        console: vec!["worker 3: CPU usage critical (97%)".to_string()],
                    })
                })
                .times(1);
        })
        .build();
    let def = scenarios::find("highcpu").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.recover)(&mut ctx).await.unwrap();

    assert_eq!(arm.count("POST", "/sites/highcpu-unit/restart"), 1);
}

/// Test that snat leaves the app alone when there is no evidence of exhaustion
#[tokio::test]
async fn test_snat_without_evidence_does_not_restart() {
    let site = TestFixtures::scenario_site("snat");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("snat").unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    (def.phases.recover)(&mut ctx).await.unwrap();

    assert!(!arm.called("POST", "/restart"));
    assert_eq!(arm.settings(&site), before);
}

/// Test the full poorheal lifecycle: error rule on, restarts found, rule removed
#[tokio::test]
async fn test_poorheal_full_lifecycle() {
    let site = TestFixtures::scenario_site("poorheal");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path())
        .with_monitor(|monitor| {
            monitor
                .expect_restart_events()
                .returning(|_, _| {
                    Ok(vec![ActivityEvent {
                        timestamp: "2026-01-01T00:00:00Z".to_string(),
                        operation: "Microsoft.Web/sites/restart/Action".to_string(),
                        sub_status: None,
                    }])
                })
                .times(1);
        })
        .build();

    let report = driver::run_scenario(run, scenarios::find("poorheal").unwrap()).await;

    assert!(report.passed(), "failed: {:?}", report.failure);
    let patches = arm.bodies("PATCH", "/sites/poorheal-unit/config/web");
    assert_eq!(patches.len(), 2);
    let rule = &patches[0]["properties"];
    assert_eq!(rule["autoHealEnabled"], json!(true));
    assert_eq!(rule["autoHealRules"]["triggers"]["statusCodesRange"][0]["statusCodes"], json!("500-530"));
    assert_eq!(
        patches[1]["properties"],
        json!({ "autoHealEnabled": false, "autoHealRules": null })
    );
    assert_eq!(arm.settings(&site), before);
}

/// Test that poorheal falls back to its marker when the rule is refused
#[tokio::test]
async fn test_poorheal_marker_fallback() {
    let site = TestFixtures::scenario_site("poorheal");
    let arm = FakeArm::new()
        .with_settings(&site, &TestFixtures::healthy_settings())
        .rejecting("PATCH", "/config/web");
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();
    let def = scenarios::find("poorheal").unwrap();
    let marker = ScenarioKind::PoorHeal.marker().unwrap();

    let mut ctx = ScenarioContext::new(run, def.kind);
    (def.phases.setup)(&mut ctx).await.unwrap();
    assert_eq!(arm.settings(&site).get(marker), Some("true"));
    (def.phases.recover)(&mut ctx).await.unwrap();

    assert_eq!(arm.settings(&site), before);
}

/// Test the full baddocker lifecycle through the driver
#[tokio::test]
async fn test_baddocker_full_lifecycle() {
    let site = TestFixtures::scenario_site("baddocker");
    let arm = FakeArm::new().with_settings(&site, &TestFixtures::healthy_settings());
    let before = arm.settings(&site);
    let zips = TestFixtures::zip_dir(false);
    let run = RunBuilder::new(arm.clone(), zips.path()).build();

    let report = driver::run_scenario(run, scenarios::find("baddocker").unwrap()).await;

    assert!(report.passed(), "failed: {:?}", report.failure);
    assert_eq!(arm.settings(&site), before);
    assert_eq!(arm.count("POST", "/sites/baddocker-unit/restart"), 2);
}
