//! Property tests for the engine argument vector
//!
//! Whatever the run configuration, the quest path comes first, flags keep
//! their fixed relative order and user extras come last, untouched.

use proptest::prelude::*;
use quest_launcher::models::MAX_VOLUME;
use quest_launcher::services::build_arguments;
use quest_launcher::services::launcher::flags;
use quest_launcher::{RunConfiguration, VideoFilter, ZoomLevel};

fn zoom_strategy() -> impl Strategy<Value = ZoomLevel> {
    prop::sample::select(ZoomLevel::ALL.to_vec())
}

fn filter_strategy() -> impl Strategy<Value = VideoFilter> {
    prop::sample::select(VideoFilter::ALL.to_vec())
}

fn run_strategy() -> impl Strategy<Value = RunConfiguration> {
    (
        "[a-z][a-z0-9 _/-]{0,20}",
        any::<bool>(),
        (zoom_strategy(), filter_strategy()),
        any::<bool>(),
        any::<bool>(),
        any::<u8>(),
        any::<u8>(),
        prop::collection::vec("-[a-z]{1,8}(=[a-z0-9]{1,4})?", 0..4),
    )
        .prop_map(
            |(path, fullscreen, (zoom, filter), software, mute, sound, music, extra)| {
                let mut run = RunConfiguration::new(path);
                run.fullscreen = fullscreen;
                run.zoom = zoom;
                run.video_filter = filter;
                run.software_rendering = software;
                run.mute = mute;
                run.sound_volume = sound;
                run.music_volume = music;
                run.extra_arguments = extra;
                run
            },
        )
}

/// Rank of a flag in the fixed order; extras rank last
fn rank(arg: &str) -> usize {
    if arg == flags::FULLSCREEN {
        0
    } else if arg.starts_with(flags::ZOOM) {
        1
    } else if arg.starts_with(flags::VIDEO_MODE) {
        2
    } else if arg == flags::SOFTWARE_RENDERING {
        3
    } else if arg == flags::NO_AUDIO || arg.starts_with(flags::SOUND_VOLUME) {
        4
    } else if arg.starts_with(flags::MUSIC_VOLUME) {
        5
    } else {
        6
    }
}

proptest! {
    #[test]
    fn quest_path_first_and_extras_last(run in run_strategy()) {
        let args = build_arguments(&run.quest_path, &run);

        prop_assert_eq!(&args[0], run.quest_path.as_str());
        let tail = &args[args.len() - run.extra_arguments.len()..];
        prop_assert_eq!(tail, run.extra_arguments.as_slice());
    }

    #[test]
    fn flags_keep_fixed_order(run in run_strategy()) {
        let args = build_arguments(&run.quest_path, &run);
        let flag_count = args.len() - 1 - run.extra_arguments.len();
        let ranks: Vec<usize> = args[1..=flag_count].iter().map(|a| rank(a)).collect();

        prop_assert!(ranks.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", args);
    }

    #[test]
    fn flags_match_configuration(run in run_strategy()) {
        let args = build_arguments(&run.quest_path, &run);
        let flag_count = args.len() - 1 - run.extra_arguments.len();
        let flag_args = &args[1..=flag_count];

        prop_assert_eq!(flag_args.contains(&flags::FULLSCREEN.to_string()), run.fullscreen);
        prop_assert_eq!(
            flag_args.contains(&flags::SOFTWARE_RENDERING.to_string()),
            run.software_rendering
        );
        prop_assert_eq!(
            flag_args.iter().any(|a| a.starts_with(flags::ZOOM)),
            run.zoom != ZoomLevel::X1
        );
        prop_assert_eq!(
            flag_args.iter().any(|a| a.starts_with(flags::VIDEO_MODE)),
            run.video_filter != VideoFilter::None
        );
        prop_assert_eq!(flag_args.contains(&flags::NO_AUDIO.to_string()), run.mute);

        if !run.mute {
            let sound = format!("{}={}", flags::SOUND_VOLUME, run.sound_volume.min(MAX_VOLUME));
            let music = format!("{}={}", flags::MUSIC_VOLUME, run.music_volume.min(MAX_VOLUME));
            prop_assert!(flag_args.contains(&sound));
            prop_assert!(flag_args.contains(&music));
        }
    }
}
