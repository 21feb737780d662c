use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use serde::Serialize;
use tokenmenu::host::{
    ActorRef, Canvas, CloseReason, Coordinator, EquipStatus, HookBus, ItemKind, MenuItem, TokenId,
    WeaponGroup, WrapperRegistry,
};
use tokenmenu::runtime::ManualClock;
use tokenmenu::sim::{
    KeyLocalization, LocalCoordinator, LocalHookBus, LocalWrapperRegistry, MemoryNotifications,
    SimActor, SimCanvas, SimToken, StaticSettings,
};
use tokenmenu::{Document, HostContext, ModuleConfig, Rect, TokenMenuModule, Vec2};
use tracing::{info, warn};

use crate::bootstrap::DemoError;
use crate::snapshot::{rasterize, save_png};

const SCENE_RECT: Rect = Rect::new(0.0, 0.0, 800.0, 600.0);
const SNAPSHOT_WIDTH: u32 = 800;
const SNAPSHOT_HEIGHT: u32 = 600;
const T1_CENTRE: Vec2 = Vec2::new(100.0, 100.0);

type ScenarioFn = fn(&DemoHost) -> Result<(), String>;

pub(crate) struct Scenario {
    pub(crate) name: &'static str,
    pub(crate) summary: &'static str,
    run: ScenarioFn,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScenarioReport {
    pub(crate) name: &'static str,
    pub(crate) passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) failure: Option<String>,
    pub(crate) closes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) snapshot: Option<String>,
}

pub(crate) fn all() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "fresh-selection",
            summary: "press and release on an unselected token opens the menu after the drag delay",
            run: fresh_selection,
        },
        Scenario {
            name: "fresh-drag",
            summary: "dragging a freshly selected token never opens the menu",
            run: fresh_drag,
        },
        Scenario {
            name: "toggle",
            summary: "clicking the sole selected token toggles the menu",
            run: toggle,
        },
        Scenario {
            name: "right-click",
            summary: "right press on the owned token closes the menu",
            run: right_click,
        },
        Scenario {
            name: "multi-select",
            summary: "adding a second token to the selection closes the menu",
            run: multi_select,
        },
        Scenario {
            name: "scene-change",
            summary: "switching scenes closes the menu and forgets every token",
            run: scene_change,
        },
    ]
}

pub(crate) fn select<'a>(scenarios: &'a [Scenario], filter: &[String]) -> Result<Vec<&'a Scenario>, DemoError> {
    if filter.is_empty() {
        return Ok(scenarios.iter().collect());
    }
    filter
        .iter()
        .map(|name| {
            scenarios
                .iter()
                .find(|scenario| scenario.name == name)
                .ok_or_else(|| DemoError::UnknownScenario(name.clone()))
        })
        .collect()
}

pub(crate) fn run(
    scenario: &Scenario,
    config: &ModuleConfig,
    snapshot_dir: Option<&Path>,
) -> Result<ScenarioReport, DemoError> {
    info!(scenario = scenario.name, summary = scenario.summary, "scenario_started");
    let host = DemoHost::new(config.clone())?;
    let outcome = (scenario.run)(&host);

    let snapshot = match snapshot_dir {
        Some(dir) => {
            let path = dir.join(format!("{}.png", scenario.name));
            let frame = rasterize(&host.canvas.stage(), SCENE_RECT, SNAPSHOT_WIDTH, SNAPSHOT_HEIGHT);
            save_png(&frame, &path)?;
            Some(path.display().to_string())
        }
        None => None,
    };

    let report = ScenarioReport {
        name: scenario.name,
        passed: outcome.is_ok(),
        failure: outcome.err(),
        closes: host.closes(),
        snapshot,
    };
    match &report.failure {
        None => info!(scenario = scenario.name, closes = ?report.closes, "scenario_passed"),
        Some(failure) => warn!(scenario = scenario.name, failure = %failure, "scenario_failed"),
    }
    host.module.deactivate();
    Ok(report)
}

pub(crate) struct DemoHost {
    clock: ManualClock,
    canvas: Rc<SimCanvas>,
    coordinator: Rc<LocalCoordinator>,
    closes: Rc<RefCell<Vec<String>>>,
    module: TokenMenuModule,
}

fn hero_items() -> Vec<MenuItem> {
    let mut rifle = MenuItem::new("rifle", "Rifle", ItemKind::Weapon);
    rifle.equip_status = EquipStatus::TwoHands;
    rifle.group = WeaponGroup::Ranged;
    rifle.damage = Some("2d8".to_string());
    rifle.range = Some("24/48/96".to_string());
    rifle.ap = 2;
    let mut knife = MenuItem::new("knife", "Knife", ItemKind::Weapon);
    knife.group = WeaponGroup::Natural;
    knife.damage = Some("Str+d4".to_string());
    let mut bolt = MenuItem::new("bolt", "Bolt", ItemKind::Power);
    bolt.power_points = Some(1);
    bolt.favorite = true;
    vec![knife, bolt, rifle]
}

impl DemoHost {
    fn new(config: ModuleConfig) -> Result<Self, DemoError> {
        let clock = ManualClock::new();
        let hooks = Rc::new(LocalHookBus::default());
        let wrappers = Rc::new(LocalWrapperRegistry::default());
        let canvas = SimCanvas::new("s1", SCENE_RECT, Rc::clone(&hooks), Rc::clone(&wrappers));
        let document = Rc::new(Document::new(Vec2::new(SCENE_RECT.width, SCENE_RECT.height)));
        canvas.attach_document(Rc::clone(&document));
        let coordinator = Rc::new(LocalCoordinator::new(
            Rc::clone(&canvas) as Rc<dyn Canvas>,
            Rc::new(clock.clone()),
            config.interaction.selection_timeout_ms,
        ));

        canvas.place_token(
            SimToken::builder("t1")
                .name("Hero")
                .position(Vec2::new(50.0, 50.0))
                .actor(SimActor::new("a1", "Hero", hero_items()) as ActorRef)
                .build(),
        );
        canvas.place_token(
            SimToken::builder("t2")
                .name("Sidekick")
                .position(Vec2::new(400.0, 50.0))
                .actor(SimActor::new("a2", "Sidekick", hero_items()) as ActorRef)
                .build(),
        );

        let module = TokenMenuModule::new(
            HostContext {
                canvas: Rc::clone(&canvas) as Rc<dyn Canvas>,
                hooks: hooks as Rc<dyn HookBus>,
                wrappers: wrappers as Rc<dyn WrapperRegistry>,
                coordinator: Rc::clone(&coordinator) as Rc<dyn Coordinator>,
                settings: Rc::new(StaticSettings::new(true, true)),
                localization: Rc::new(KeyLocalization::english()),
                notifications: Rc::new(MemoryNotifications::default()),
                document,
                clock: Rc::new(clock.clone()),
                enhancement_provider: None,
            },
            config,
        )?;
        module.activate()?;

        let closes = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&closes);
        module.weapon_menu().on_close(Rc::new(move |token: &TokenId, reason: CloseReason| {
            log.borrow_mut().push(format!("{token}:{}", reason.as_str()));
        }));

        Ok(Self {
            clock,
            canvas,
            coordinator,
            closes,
            module,
        })
    }

    fn advance(&self, ms: u64) {
        self.clock.advance_ms(ms);
        self.module.frame();
    }

    fn click(&self, at: Vec2) {
        self.canvas.left_press(at);
        self.canvas.left_release(at);
    }

    fn open_token(&self) -> Option<TokenId> {
        self.module.weapon_menu().open_token()
    }

    fn closes(&self) -> Vec<String> {
        self.closes.borrow().clone()
    }

    fn open_menu_on_t1(&self) -> Result<(), String> {
        self.canvas.control("t1", true);
        self.advance(100);
        self.click(T1_CENTRE);
        expect_open(self, Some("t1"))?;
        self.advance(100);
        Ok(())
    }
}

fn expect_open(host: &DemoHost, token: Option<&str>) -> Result<(), String> {
    let expected = token.map(TokenId::from);
    let actual = host.open_token();
    if actual != expected {
        return Err(format!("expected open menu {expected:?}, found {actual:?}"));
    }
    if host.coordinator.open_menu() != expected {
        return Err(format!(
            "coordinator disagrees: {:?}",
            host.coordinator.open_menu()
        ));
    }
    Ok(())
}

fn expect(condition: bool, message: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.to_string())
    }
}

fn fresh_selection(host: &DemoHost) -> Result<(), String> {
    host.canvas.left_press(T1_CENTRE);
    host.advance(50);
    host.canvas.left_release(Vec2::new(101.0, 100.0));
    host.advance(149);
    expect_open(host, None)?;
    host.advance(1);
    expect_open(host, Some("t1"))
}

fn fresh_drag(host: &DemoHost) -> Result<(), String> {
    host.canvas.left_press(T1_CENTRE);
    host.advance(40);
    host.canvas.pointer_move(Vec2::new(110.0, 100.0));
    host.advance(40);
    host.canvas.left_release(Vec2::new(110.0, 100.0));
    host.advance(120);
    expect_open(host, None)?;
    expect(
        !host.module.interaction().has_pending_open(),
        "deferred open still scheduled after drag",
    )
}

fn toggle(host: &DemoHost) -> Result<(), String> {
    host.open_menu_on_t1()?;
    host.click(T1_CENTRE);
    expect_open(host, None)?;
    expect(host.closes() == ["t1:toggle"], "second click did not toggle the menu closed")
}

fn right_click(host: &DemoHost) -> Result<(), String> {
    host.open_menu_on_t1()?;
    host.canvas.right_press(T1_CENTRE);
    expect_open(host, None)?;
    expect(
        !host.module.interaction().has_pending_open(),
        "right press left a deferred open scheduled",
    )
}

fn multi_select(host: &DemoHost) -> Result<(), String> {
    host.open_menu_on_t1()?;
    host.canvas.marquee_select(&["t2"], true);
    expect_open(host, None)?;
    expect(
        host.closes() == ["t1:multi_select"],
        "menu did not close for multi-select",
    )
}

fn scene_change(host: &DemoHost) -> Result<(), String> {
    host.open_menu_on_t1()?;
    host.canvas
        .switch_scene("s2", Rect::new(0.0, 0.0, 1200.0, 900.0));
    expect_open(host, None)?;
    let interaction = host.module.interaction();
    expect(
        interaction.controlled_count() == 0,
        "controlled tokens survived the scene change",
    )?;
    expect(
        interaction.listener_token_count() == 0,
        "token listeners survived the scene change",
    )
}
