//! 슬라이딩 윈도우 -- 이벤트 시간 기반의 유한 윈도우 상태
//!
//! 모든 탐지기와 상관 규칙이 같은 제거 규칙을 공유합니다.
//!
//! - 키별 워터마크는 지금까지 관측한 가장 늦은 이벤트 시각입니다.
//! - 평가 시점에 남아 있는 모든 엔트리는 `watermark - entry.timestamp <= horizon`을 만족합니다.
//! - 제거는 해당 키를 관측할 때 지연 수행됩니다.
//! - `watermark - horizon`보다 오래된 관측은 너무 늦은 것으로 보고 삽입하지 않습니다.
//! - 호라이즌 안쪽의 늦은 관측은 정렬 위치에 삽입됩니다.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};

/// 키당 기본 최대 엔트리 수
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// 관측 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// 윈도우에 삽입됨
    Accepted,
    /// 워터마크 기준 호라이즌 밖이라 버려짐
    TooLate,
}

/// 윈도우 엔트리
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry<T> {
    /// 이벤트 시각
    pub timestamp: DateTime<Utc>,
    /// 관측 값
    pub value: T,
}

/// 단일 키의 슬라이딩 윈도우
///
/// 엔트리는 시각 순으로 정렬되어 있으며 같은 시각은 도착 순서를 유지합니다.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    entries: VecDeque<WindowEntry<T>>,
    horizon: Duration,
    watermark: Option<DateTime<Utc>>,
    max_entries: usize,
}

impl<T> SlidingWindow<T> {
    /// 주어진 호라이즌으로 빈 윈도우를 만듭니다.
    pub fn new(horizon: Duration) -> Self {
        Self::with_max_entries(horizon, DEFAULT_MAX_ENTRIES)
    }

    /// 최대 엔트리 수를 지정하여 빈 윈도우를 만듭니다.
    ///
    /// 상한을 넘으면 가장 오래된 엔트리부터 버립니다.
    pub fn with_max_entries(horizon: Duration, max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            horizon,
            watermark: None,
            max_entries: max_entries.max(1),
        }
    }

    /// 관측 하나를 반영하고 만료된 엔트리를 제거합니다.
    pub fn observe(&mut self, timestamp: DateTime<Utc>, value: T) -> Admission {
        if self.advance(timestamp) == Admission::TooLate {
            return Admission::TooLate;
        }

        let position = self.entries.partition_point(|e| e.timestamp <= timestamp);
        self.entries.insert(position, WindowEntry { timestamp, value });

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }

        Admission::Accepted
    }

    /// 엔트리를 넣지 않고 워터마크만 전진시킨 뒤 만료된 엔트리를 제거합니다.
    ///
    /// 삽입 전에 윈도우 내용을 확인해야 하는 탐지기가 사용합니다.
    pub fn advance(&mut self, timestamp: DateTime<Utc>) -> Admission {
        if let Some(watermark) = self.watermark {
            if timestamp < watermark - self.horizon {
                return Admission::TooLate;
            }
        }
        self.watermark = Some(self.watermark.map_or(timestamp, |w| w.max(timestamp)));
        self.evict_expired();
        Admission::Accepted
    }

    /// 워터마크 기준으로 만료된 엔트리를 제거합니다.
    pub fn evict_expired(&mut self) {
        let Some(watermark) = self.watermark else {
            return;
        };
        let cutoff = watermark - self.horizon;
        while self
            .entries
            .front()
            .is_some_and(|front| front.timestamp < cutoff)
        {
            self.entries.pop_front();
        }
    }

    /// 조건에 맞는 첫 엔트리를 꺼냅니다.
    pub fn take_first<F>(&mut self, predicate: F) -> Option<WindowEntry<T>>
    where
        F: Fn(&T) -> bool,
    {
        let index = self.entries.iter().position(|e| predicate(&e.value))?;
        self.entries.remove(index)
    }

    /// 조건에 맞는 엔트리가 있는지 확인합니다.
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        self.entries.iter().any(|e| predicate(&e.value))
    }

    /// 시각 순 엔트리 이터레이터
    pub fn iter(&self) -> impl Iterator<Item = &WindowEntry<T>> {
        self.entries.iter()
    }

    /// 가장 오래된 엔트리
    pub fn oldest(&self) -> Option<&WindowEntry<T>> {
        self.entries.front()
    }

    /// 엔트리 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 지금까지 관측한 가장 늦은 시각
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// 윈도우 호라이즌
    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// `now` 기준으로 호라이즌 이상 관측이 없었는지 여부
    pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
        self.watermark.is_none_or(|w| w < now - self.horizon)
    }
}

/// 임계값 재무장(hysteresis) 상태
///
/// 발화 후에는 조건이 한 번 해제되어야 다시 발화할 수 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hysteresis {
    armed: bool,
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self { armed: true }
    }
}

impl Hysteresis {
    /// 현재 조건을 반영하고, 이번 관측에서 발화해야 하면 `true`를 반환합니다.
    pub fn update(&mut self, condition_holds: bool) -> bool {
        match (condition_holds, self.armed) {
            (true, true) => {
                self.armed = false;
                true
            }
            (false, _) => {
                self.armed = true;
                false
            }
            (true, false) => false,
        }
    }

    /// 발화 가능 상태 여부
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// 키 하나에 속한 윈도우와 부가 상태
#[derive(Debug, Clone)]
pub struct WindowSlot<T, S> {
    /// 윈도우
    pub window: SlidingWindow<T>,
    /// 키별 부가 상태 (예: [`Hysteresis`])
    pub state: S,
}

/// 그룹핑 키별 윈도우 집합
///
/// 키는 처음 관측될 때 생성되고, [`prune_idle`](Self::prune_idle)로 정리됩니다.
/// 키 수가 `max_keys`에 도달하면 워터마크가 가장 오래된 키를 먼저 버립니다.
#[derive(Debug, Clone)]
pub struct KeyedWindows<K, T, S = ()> {
    slots: HashMap<K, WindowSlot<T, S>>,
    horizon: Duration,
    max_entries_per_key: usize,
    max_keys: usize,
    late_events: u64,
    evicted_keys: u64,
}

impl<K, T, S> KeyedWindows<K, T, S>
where
    K: Eq + Hash + Clone,
    S: Default,
{
    /// 새 키별 윈도우 집합을 만듭니다.
    pub fn new(horizon: Duration, max_entries_per_key: usize, max_keys: usize) -> Self {
        Self {
            slots: HashMap::new(),
            horizon,
            max_entries_per_key,
            max_keys: max_keys.max(1),
            late_events: 0,
            evicted_keys: 0,
        }
    }

    /// 키의 슬롯을 가져오거나 새로 만듭니다.
    pub fn slot_mut(&mut self, key: &K) -> &mut WindowSlot<T, S> {
        if !self.slots.contains_key(key) && self.slots.len() >= self.max_keys {
            self.evict_stalest_key();
        }
        let horizon = self.horizon;
        let max_entries = self.max_entries_per_key;
        self.slots
            .entry(key.clone())
            .or_insert_with(|| WindowSlot {
                window: SlidingWindow::with_max_entries(horizon, max_entries),
                state: S::default(),
            })
    }

    /// 관측을 반영하고 해당 키의 슬롯을 돌려줍니다.
    ///
    /// 너무 늦은 관측이면 카운트만 올리고 `None`을 반환합니다.
    pub fn observe(
        &mut self,
        key: &K,
        timestamp: DateTime<Utc>,
        value: T,
    ) -> Option<&mut WindowSlot<T, S>> {
        let admission = self.slot_mut(key).window.observe(timestamp, value);
        if admission == Admission::TooLate {
            self.late_events += 1;
            return None;
        }
        self.slots.get_mut(key)
    }

    /// 키의 워터마크만 전진시키고 슬롯을 돌려줍니다.
    ///
    /// 너무 늦은 관측이면 카운트만 올리고 `None`을 반환합니다.
    pub fn advance(&mut self, key: &K, timestamp: DateTime<Utc>) -> Option<&mut WindowSlot<T, S>> {
        let admission = self.slot_mut(key).window.advance(timestamp);
        if admission == Admission::TooLate {
            self.late_events += 1;
            return None;
        }
        self.slots.get_mut(key)
    }

    /// 키의 슬롯 (읽기 전용)
    pub fn get(&self, key: &K) -> Option<&WindowSlot<T, S>> {
        self.slots.get(key)
    }

    /// `now` 기준으로 호라이즌 넘게 관측이 없던 키를 제거하고 제거 수를 반환합니다.
    pub fn prune_idle(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.window.is_idle(now));
        before - self.slots.len()
    }

    fn evict_stalest_key(&mut self) {
        let stalest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.window.watermark())
            .map(|(k, _)| k.clone());
        if let Some(key) = stalest {
            self.slots.remove(&key);
            self.evicted_keys += 1;
        }
    }

    /// 추적 중인 키 수
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 너무 늦어 버려진 관측 수
    pub fn late_events(&self) -> u64 {
        self.late_events
    }

    /// 키 상한 때문에 버려진 키 수
    pub fn evicted_keys(&self) -> u64 {
        self.evicted_keys
    }

    /// 모든 상태를 비웁니다.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
