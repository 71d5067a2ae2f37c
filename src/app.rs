use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dispatch_api::{create_app, AppState};
use dispatch_core::{AppConfig, PushNotifier, RejectionCache};
use dispatch_engine::{DispatchDependencies, DispatchEngine};
use dispatch_infrastructure::{
    database::create_pool, observability::init_metrics, BroadcastRealtimeChannel,
    HttpPushNotifier, InMemoryConnectionRegistry, InMemoryRejectionCache, MetricsCollector,
    NoopPushNotifier, PostgresCourierRegistry, PostgresOrderStore, RealtimeTarget,
    RedisRejectionCache,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 内存拒单缓存的过期清理间隔
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// 派单服务
///
/// 组装存储、缓存、实时通道和推送，启动派单引擎和接入网关。
/// 网关与引擎共用同一个连接注册表和实时通道：骑手通过网关上线后才会收到推送。
pub struct Application {
    config: AppConfig,
    engine: DispatchEngine,
    connections: Arc<InMemoryConnectionRegistry>,
    realtime: Arc<BroadcastRealtimeChannel>,
    memory_cache: Option<Arc<InMemoryRejectionCache>>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化派单服务");

        if config.observability.metrics_enabled {
            init_metrics(config.observability.metrics_port).context("初始化指标导出失败")?;
        }
        let metrics = Arc::new(MetricsCollector::new());

        info!("连接数据库: {}", mask_url(&config.database.url));
        let pool = create_pool(&config.database)
            .await
            .context("连接数据库失败")?;

        let (rejection_cache, memory_cache) = create_rejection_cache(&config).await?;
        let push = create_push_notifier(&config)?;
        let realtime = Arc::new(BroadcastRealtimeChannel::default());
        let connections = Arc::new(InMemoryConnectionRegistry::new());

        let deps = DispatchDependencies {
            courier_registry: Arc::new(PostgresCourierRegistry::new(pool.clone())),
            connection_registry: connections.clone(),
            order_store: Arc::new(PostgresOrderStore::new(pool)),
            rejection_cache,
            realtime: realtime.clone(),
            push,
            metrics,
        };
        let engine = DispatchEngine::start(deps, &config.dispatcher);

        Ok(Self {
            config,
            engine,
            connections,
            realtime,
            memory_cache,
        })
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut background: Vec<JoinHandle<()>> = Vec::new();
        background.push(self.spawn_realtime_log(shutdown_rx.resubscribe()));

        let server = if self.config.api.enabled {
            Some(self.spawn_api_server(shutdown_rx.resubscribe()).await?)
        } else {
            warn!("接入网关未启用，骑手无法上线，订单只会进入等待");
            None
        };
        if let Some(cache) = &self.memory_cache {
            background.push(spawn_cache_purge(
                Arc::clone(cache),
                shutdown_rx.resubscribe(),
            ));
        }

        // 启动时扫描一次，接管上次退出时未分配的订单
        match self.engine.trigger_recovery_sweep().await {
            Ok(report) => info!("启动恢复扫描入队 {} 个订单", report.enqueued.len()),
            Err(e) => error!("启动恢复扫描失败: {}", e),
        }

        if let Some(interval) = self.config.dispatcher.recovery_interval() {
            info!("周期恢复扫描间隔: {}秒", interval.as_secs());
            background.push(
                self.engine
                    .spawn_periodic_recovery(interval, shutdown_rx.resubscribe()),
            );
        }

        let _ = shutdown_rx.recv().await;
        info!("派单服务收到关闭信号");

        // 先停止接收请求，再停止引擎
        if let Some(server) = server {
            if let Err(e) = server.await {
                warn!("接入网关退出异常: {}", e);
            }
        }
        self.engine.shutdown().await;
        for handle in background {
            if let Err(e) = handle.await {
                warn!("后台任务退出异常: {}", e);
            }
        }
        Ok(())
    }

    /// 启动HTTP和WebSocket接入网关，收到关闭信号后不再接受新连接
    async fn spawn_api_server(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>> {
        let app = create_app(
            AppState {
                engine: self.engine.clone(),
                connections: Arc::clone(&self.connections),
                realtime: Arc::clone(&self.realtime),
            },
            self.config.api.cors_enabled,
        );

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("接入网关启动在 http://{}", self.config.api.bind_address);

        Ok(tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            });
            if let Err(e) = serve.await {
                error!("接入网关运行失败: {}", e);
            }
            info!("接入网关已停止");
        }))
    }

    /// 在没有网关订阅时也保持通道可用，并在调试级别记录待投递事件
    fn spawn_realtime_log(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut events = self.realtime.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(envelope) => {
                            let target = match &envelope.target {
                                RealtimeTarget::Courier(id) => format!("courier:{id}"),
                                RealtimeTarget::AllCouriers => "couriers".to_string(),
                                RealtimeTarget::Vendor(id) => format!("vendor:{id}"),
                            };
                            debug!(
                                target_id = %target,
                                order_id = envelope.event.order_id(),
                                "实时事件 {}",
                                envelope.event.name()
                            );
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("实时事件日志落后，跳过 {} 条", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }
}

async fn create_rejection_cache(
    config: &AppConfig,
) -> Result<(Arc<dyn RejectionCache>, Option<Arc<InMemoryRejectionCache>>)> {
    if config.redis.enabled {
        info!("连接Redis拒单缓存: {}", mask_url(&config.redis.url));
        let cache = RedisRejectionCache::connect(&config.redis.url, config.redis.key_prefix.clone())
            .await
            .context("连接Redis失败")?;
        let shared: Arc<dyn RejectionCache> = Arc::new(cache);
        return Ok((shared, None));
    }

    warn!("未启用Redis，拒单记录只保存在进程内存中");
    let cache = Arc::new(InMemoryRejectionCache::new());
    let shared: Arc<dyn RejectionCache> = cache.clone();
    Ok((shared, Some(cache)))
}

fn create_push_notifier(config: &AppConfig) -> Result<Arc<dyn PushNotifier>> {
    if config.push.enabled {
        info!("移动推送网关: {}", config.push.endpoint);
        let notifier = HttpPushNotifier::new(&config.push).context("创建推送客户端失败")?;
        return Ok(Arc::new(notifier));
    }
    info!("移动推送未启用");
    Ok(Arc::new(NoopPushNotifier))
}

fn spawn_cache_purge(
    cache: Arc<InMemoryRejectionCache>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = cache.purge_expired().await;
                    if purged > 0 {
                        debug!("清理过期拒单记录 {} 条", purged);
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}

/// 屏蔽连接URL中的密码
fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // 只有用户名没有密码时冒号属于协议部分
            if url[colon_pos..].starts_with("://") {
                return url.to_string();
            }
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
